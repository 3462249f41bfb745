//! REST client for the diagram service.
//!
//! Wire records use Mongo-style `_id` keys, camelCase fields and plain id
//! strings for link endpoints. Create endpoints answer with either the new
//! record or the whole updated diagram.
//!
//! The service also hosts a code generator that turns a diagram into a zip
//! of source files; [`HttpStore::generate_code`] calls it.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};
use umlsync_core::{
    ClassPatch, Diagram, DiagramClass, DiagramId, DiagramLink, DiagramSummary, DurableId, EdgeLabels, Endpoint,
    LinkPatch, LinkType, NewClass, NewLink, Position, Size,
};

use super::ModelStore;
use crate::error::{StoreError, StoreResult};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireClass {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    attributes: Vec<String>,
    #[serde(default)]
    methods: Vec<String>,
    #[serde(default)]
    position: Position,
    #[serde(default)]
    size: Size,
}

impl WireClass {
    fn into_class(self) -> DiagramClass {
        DiagramClass {
            id: DurableId::new(self.id),
            name: self.name,
            attributes: self.attributes,
            methods: self.methods,
            position: self.position,
            size: self.size,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireLink {
    #[serde(rename = "_id")]
    id: String,
    source: String,
    target: String,
    #[serde(default)]
    link_type: String,
    #[serde(default)]
    source_multiplicity: String,
    #[serde(default)]
    target_multiplicity: String,
}

impl WireLink {
    fn link_type(&self) -> LinkType {
        self.link_type.parse().unwrap_or_else(|e| {
            warn!(link = %self.id, error = %e, "treating link as association");
            LinkType::Association
        })
    }

    /// Endpoints are plain ids; `resolve` decides whether each names a class or a link
    fn into_link(self, resolve: impl Fn(&str) -> Endpoint) -> DiagramLink {
        DiagramLink {
            link_type: self.link_type(),
            source: resolve(&self.source),
            target: resolve(&self.target),
            id: DurableId::new(self.id),
            source_multiplicity: self.source_multiplicity,
            target_multiplicity: self.target_multiplicity,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireDiagram {
    #[serde(rename = "_id", default)]
    id: Option<String>,
    classes: Vec<WireClass>,
    links: Vec<WireLink>,
}

impl WireDiagram {
    fn into_diagram(self) -> Diagram {
        let classes: Vec<DiagramClass> = self.classes.into_iter().map(WireClass::into_class).collect();
        let link_ids: Vec<String> = self.links.iter().map(|l| l.id.clone()).collect();
        let resolve = |id: &str| {
            if link_ids.iter().any(|l| l == id) && !classes.iter().any(|c| c.id.as_str() == id) {
                Endpoint::Link(DurableId::from(id))
            } else {
                Endpoint::Class(DurableId::from(id))
            }
        };
        let links = self.links.into_iter().map(|l| l.into_link(&resolve)).collect();
        Diagram { id: self.id.map(DiagramId::new), classes, links }
    }
}

#[derive(Debug, Deserialize)]
struct WireSummary {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    name: String,
}

impl WireSummary {
    fn into_summary(self) -> DiagramSummary {
        DiagramSummary { id: DiagramId::new(self.id), name: self.name }
    }
}

/// Generator input: plain classes, and links between plain classes only
#[derive(Debug, Serialize)]
struct GeneratorRequest<'a> {
    classes: Vec<GeneratorClass<'a>>,
    links: Vec<GeneratorLink<'a>>,
}

#[derive(Debug, Serialize)]
struct GeneratorClass<'a> {
    id: &'a str,
    name: &'a str,
    attributes: &'a [String],
    methods: &'a [String],
}

#[derive(Debug, Serialize)]
struct GeneratorLink<'a> {
    id: &'a str,
    source: &'a str,
    target: &'a str,
    /// Link type, source multiplicity, target multiplicity
    labels: [String; 3],
}

impl<'a> GeneratorRequest<'a> {
    /// Intermediate classes and every link touching a link are left out
    fn from_diagram(diagram: &'a Diagram) -> Self {
        let intermediate: Vec<&DurableId> = diagram.constructs().map(|c| &c.class.id).collect();
        let classes = diagram
            .classes
            .iter()
            .filter(|c| !intermediate.contains(&&c.id))
            .map(|c| GeneratorClass {
                id: c.id.as_str(),
                name: &c.name,
                attributes: &c.attributes,
                methods: &c.methods,
            })
            .collect();
        let links = diagram
            .links
            .iter()
            .filter_map(|link| {
                let source = link.source.as_class()?;
                let target = link.target.as_class()?;
                if intermediate.contains(&source) || intermediate.contains(&target) {
                    return None;
                }
                let labels = EdgeLabels::for_link(link);
                Some(GeneratorLink {
                    id: link.id.as_str(),
                    source: source.as_str(),
                    target: target.as_str(),
                    labels: [labels.link_type, labels.source_multiplicity, labels.target_multiplicity],
                })
            })
            .collect();
        Self { classes, links }
    }
}

/// Create responses: the whole diagram or just the new record
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Created<T> {
    Diagram(WireDiagram),
    Record(T),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LinkBody<'a> {
    source: &'a str,
    target: &'a str,
    link_type: LinkType,
    source_multiplicity: &'a str,
    target_multiplicity: &'a str,
}

/// Model Store over the diagram service's REST API
#[derive(Debug, Clone)]
pub struct HttpStore {
    base_url: String,
    client: Client,
}

impl HttpStore {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> StoreResult<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(transport)?;
        Ok(Self::with_client(base_url, client))
    }

    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, client }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, diagram: &DiagramId, path: &str) -> String {
        format!("{}/diagrams/{}{}", self.base_url, diagram, path)
    }

    fn diagrams_url(&self) -> String {
        format!("{}/diagrams/", self.base_url)
    }

    /// Run the service's code generator over `diagram`; the answer is a zip archive
    pub async fn generate_code(&self, diagram: &Diagram) -> StoreResult<Vec<u8>> {
        let request = GeneratorRequest::from_diagram(diagram);
        debug!(classes = request.classes.len(), links = request.links.len(), "requesting generated code");
        let response = self
            .client
            .post(format!("{}/generator", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(transport)?;
        let response = check(response).await?;
        let archive = response.bytes().await.map_err(transport)?;
        Ok(archive.to_vec())
    }
}

fn transport(err: reqwest::Error) -> StoreError {
    StoreError::Network { status: err.status().map(|s| s.as_u16()), message: err.to_string() }
}

/// Non-2xx becomes `Validation` for client mistakes the caller can act on,
/// `Network` for everything else. The body text is kept as the message.
async fn check(response: Response) -> StoreResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_else(|_| status.to_string());
    Err(status_error(status, message))
}

fn status_error(status: StatusCode, message: String) -> StoreError {
    match status.as_u16() {
        code @ (400 | 404 | 409 | 422) => StoreError::Validation { status: code, message },
        code => StoreError::Network { status: Some(code), message },
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> StoreResult<T> {
    let response = check(response).await?;
    response.json::<T>().await.map_err(|e| StoreError::Network {
        status: None,
        message: format!("failed to parse response: {e}"),
    })
}

async fn expect_ok(response: Response) -> StoreResult<()> {
    check(response).await.map(|_| ())
}

fn missing_record(kind: &str) -> StoreError {
    StoreError::Network { status: None, message: format!("response carried no {kind}") }
}

#[async_trait]
impl ModelStore for HttpStore {
    async fn list_diagrams(&self) -> StoreResult<Vec<DiagramSummary>> {
        let response = self.client.get(self.diagrams_url()).send().await.map_err(transport)?;
        let wire: Vec<WireSummary> = read_json(response).await?;
        Ok(wire.into_iter().map(WireSummary::into_summary).collect())
    }

    async fn create_diagram(&self, name: &str) -> StoreResult<DiagramSummary> {
        let response = self
            .client
            .post(self.diagrams_url())
            .json(&json!({ "name": name }))
            .send()
            .await
            .map_err(transport)?;
        let created: WireSummary = read_json(response).await?;
        debug!(id = %created.id, name, "created diagram");
        Ok(created.into_summary())
    }

    async fn get_diagram(&self, diagram: &DiagramId) -> StoreResult<Diagram> {
        let response = self.client.get(self.url(diagram, "")).send().await.map_err(transport)?;
        let wire: WireDiagram = read_json(response).await?;
        let mut loaded = wire.into_diagram();
        loaded.id = Some(diagram.clone());
        debug!(%diagram, classes = loaded.classes.len(), links = loaded.links.len(), "loaded diagram");
        Ok(loaded)
    }

    async fn create_class(&self, diagram: &DiagramId, class: NewClass) -> StoreResult<DiagramClass> {
        let response = self
            .client
            .post(self.url(diagram, "/classes"))
            .json(&class)
            .send()
            .await
            .map_err(transport)?;
        match read_json::<Created<WireClass>>(response).await? {
            Created::Record(record) => Ok(record.into_class()),
            Created::Diagram(wire) => wire
                .into_diagram()
                .classes
                .pop()
                .ok_or_else(|| missing_record("class")),
        }
    }

    async fn create_link(&self, diagram: &DiagramId, link: NewLink) -> StoreResult<DiagramLink> {
        let body = LinkBody {
            source: link.source.id().as_str(),
            target: link.target.id().as_str(),
            link_type: link.link_type,
            source_multiplicity: &link.source_multiplicity,
            target_multiplicity: &link.target_multiplicity,
        };
        let response = self
            .client
            .post(self.url(diagram, "/links"))
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        let id = match read_json::<Created<WireLink>>(response).await? {
            Created::Record(record) => record.id,
            Created::Diagram(wire) => wire.links.last().map(|l| l.id.clone()).ok_or_else(|| missing_record("link"))?,
        };
        // The request already says whether each endpoint is a class or a link.
        Ok(link.into_link(DurableId::new(id)))
    }

    async fn update_class_position(
        &self,
        diagram: &DiagramId,
        class: &DurableId,
        position: Position,
    ) -> StoreResult<()> {
        let response = self
            .client
            .put(self.url(diagram, &format!("/classes/{class}/position")))
            .json(&json!({ "position": position }))
            .send()
            .await
            .map_err(transport)?;
        expect_ok(response).await
    }

    async fn update_class(&self, diagram: &DiagramId, class: &DurableId, patch: &ClassPatch) -> StoreResult<()> {
        let response = self
            .client
            .put(self.url(diagram, &format!("/classes/{class}")))
            .json(patch)
            .send()
            .await
            .map_err(transport)?;
        expect_ok(response).await
    }

    async fn update_link(&self, diagram: &DiagramId, link: &DurableId, patch: &LinkPatch) -> StoreResult<()> {
        let response = self
            .client
            .put(self.url(diagram, &format!("/links/{link}")))
            .json(patch)
            .send()
            .await
            .map_err(transport)?;
        expect_ok(response).await
    }

    async fn delete_class(&self, diagram: &DiagramId, class: &DurableId) -> StoreResult<()> {
        let response = self
            .client
            .delete(self.url(diagram, &format!("/classes/{class}")))
            .send()
            .await
            .map_err(transport)?;
        expect_ok(response).await
    }

    async fn delete_link(&self, diagram: &DiagramId, link: &DurableId) -> StoreResult<()> {
        let response = self
            .client
            .delete(self.url(diagram, &format!("/links/{link}")))
            .send()
            .await
            .map_err(transport)?;
        expect_ok(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIAGRAM: &str = r#"{
        "_id": "d1",
        "name": "Shop",
        "classes": [
            {"_id": "c1", "name": "Order", "attributes": ["id: int"], "methods": [],
             "position": {"x": 10, "y": 20}, "size": {"width": 200, "height": 100}},
            {"_id": "c2", "name": "Customer"},
            {"_id": "c3", "name": "Line"}
        ],
        "links": [
            {"_id": "l1", "source": "c1", "target": "c2", "linkType": "intermediate",
             "sourceMultiplicity": "1..1", "targetMultiplicity": "0..*"},
            {"_id": "l2", "source": "l1", "target": "c3", "linkType": "intermediate"}
        ]
    }"#;

    #[test]
    fn diagram_endpoints_resolve_to_classes_or_links() {
        let wire: WireDiagram = serde_json::from_str(DIAGRAM).unwrap();
        let diagram = wire.into_diagram();

        assert_eq!(diagram.classes.len(), 3);
        assert_eq!(diagram.classes[0].position, Position::new(10.0, 20.0));
        assert_eq!(diagram.classes[1].size, Size::default());

        let dashed = diagram.link(&"l2".into()).unwrap();
        assert_eq!(dashed.source, Endpoint::Link("l1".into()));
        assert_eq!(dashed.target, Endpoint::Class("c3".into()));
        assert_eq!(diagram.constructs().count(), 1);
    }

    #[test]
    fn create_response_may_be_record_or_diagram() {
        let record: Created<WireClass> = serde_json::from_str(r#"{"_id": "c9", "name": "New"}"#).unwrap();
        assert!(matches!(record, Created::Record(c) if c.id == "c9"));

        let whole: Created<WireClass> = serde_json::from_str(DIAGRAM).unwrap();
        match whole {
            Created::Diagram(d) => assert_eq!(d.into_diagram().classes.pop().unwrap().name, "Line"),
            Created::Record(_) => panic!("diagram response read as a record"),
        }
    }

    #[test]
    fn unknown_link_type_falls_back_to_association() {
        let link: WireLink = serde_json::from_str(r#"{"_id": "l", "source": "a", "target": "b", "linkType": "uses"}"#)
            .unwrap();
        assert_eq!(link.link_type(), LinkType::Association);
    }

    #[test]
    fn status_codes_split_into_validation_and_network() {
        assert!(matches!(
            status_error(StatusCode::UNPROCESSABLE_ENTITY, "bad".into()),
            StoreError::Validation { status: 422, .. }
        ));
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, "gone".into()),
            StoreError::Validation { status: 404, .. }
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, "upstream".into()),
            StoreError::Network { status: Some(502), .. }
        ));
    }

    #[test]
    fn link_body_uses_plain_ids() {
        let link = NewLink {
            source: Endpoint::Link("l1".into()),
            target: Endpoint::Class("c3".into()),
            link_type: LinkType::Intermediate,
            source_multiplicity: String::new(),
            target_multiplicity: String::new(),
        };
        let body = LinkBody {
            source: link.source.id().as_str(),
            target: link.target.id().as_str(),
            link_type: link.link_type,
            source_multiplicity: &link.source_multiplicity,
            target_multiplicity: &link.target_multiplicity,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["source"], "l1");
        assert_eq!(json["linkType"], "intermediate");
    }

    #[test]
    fn urls_are_scoped_to_the_diagram() {
        let store = HttpStore::with_client("http://localhost:5000/", Client::new());
        assert_eq!(store.url(&DiagramId::new("d1"), "/classes"), "http://localhost:5000/diagrams/d1/classes");
        assert_eq!(store.diagrams_url(), "http://localhost:5000/diagrams/");
    }

    #[test]
    fn diagram_list_entries_read_id_and_name() {
        let list: Vec<WireSummary> =
            serde_json::from_str(r#"[{"_id": "d1", "name": "Shop", "classes": []}, {"_id": "d2"}]"#).unwrap();
        let summaries: Vec<DiagramSummary> = list.into_iter().map(WireSummary::into_summary).collect();
        assert_eq!(summaries[0], DiagramSummary { id: DiagramId::new("d1"), name: "Shop".into() });
        assert_eq!(summaries[1].name, "");

        let created: WireSummary = serde_json::from_str(DIAGRAM).unwrap();
        assert_eq!(created.into_summary().name, "Shop");
    }

    #[test]
    fn generator_request_skips_intermediate_classes() {
        let wire: WireDiagram = serde_json::from_str(DIAGRAM).unwrap();
        let mut diagram = wire.into_diagram();
        diagram.links.push(DiagramLink {
            id: "l3".into(),
            source: Endpoint::Class("c2".into()),
            target: Endpoint::Class("c1".into()),
            link_type: LinkType::Composition,
            source_multiplicity: "1..1".into(),
            target_multiplicity: "1..*".into(),
        });

        let json = serde_json::to_value(GeneratorRequest::from_diagram(&diagram)).unwrap();
        let classes: Vec<&str> = json["classes"].as_array().unwrap().iter().map(|c| c["name"].as_str().unwrap()).collect();
        assert_eq!(classes, ["Order", "Customer"]);
        assert_eq!(json["classes"][0]["attributes"][0], "id: int");

        let links = json["links"].as_array().unwrap();
        let ids: Vec<&str> = links.iter().map(|l| l["id"].as_str().unwrap()).collect();
        assert_eq!(ids, ["l1", "l3"]);
        let labels = EdgeLabels::for_link(diagram.link(&"l3".into()).unwrap());
        assert_eq!(links[1]["labels"], serde_json::json!([labels.link_type, labels.source_multiplicity, labels.target_multiplicity]));
        assert_eq!(links[1]["source"], "c2");
    }
}
