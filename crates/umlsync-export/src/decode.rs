//! Exchange document import.
//!
//! Two dialects are understood:
//! - XMI 2 as written by [`crate::encode`] (`packagedElement` with `xmi:type`)
//! - UML 1.x (`UML:Class`, `UML:Association`, ... with `xmi.id`)
//!
//! Classes are collected in a first pass, relationships in a second. An
//! association class counts as a class: relationships naming its id attach
//! to the intermediate class of the construct. A relationship naming any
//! other id that is not a class of the document is dropped with an
//! [`ImportIssue`]; the rest of the document still decodes.

use std::collections::HashSet;

use thiserror::Error;
use tracing::{debug, warn};
use umlsync_core::{Descriptor, LinkType, Multiplicity};

use crate::plan::{ImportIssue, ImportPlan, PlannedClass, PlannedLink, PlannedRelationship};
use crate::xml::{self, Element, XmlError};

/// Placeholder root class some UML tools add to every model
const ROOT_PLACEHOLDER: &str = "EARootClass";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error(transparent)]
    Xml(#[from] XmlError),
}

pub fn decode(text: &str) -> Result<ImportPlan, DecodeError> {
    let root = xml::parse(text)?;
    let mut decoder = Decoder::default();

    let elements: Vec<&Element> = std::iter::once(&root).chain(root.descendants()).collect();
    for element in &elements {
        decoder.class_element(element);
    }
    for element in &elements {
        decoder.relationship_element(element);
    }

    let plan = decoder.finish();
    debug!(
        classes = plan.classes.len(),
        relationships = plan.relationships.len(),
        issues = plan.issues.len(),
        "decoded exchange document"
    );
    Ok(plan)
}

fn xmi_type(element: &Element) -> Option<&str> {
    element.attr("xmi:type")
}

/// `xmi:id` in XMI 2, `xmi.id` in UML 1.x
fn document_id(element: &Element) -> Option<&str> {
    element.attr_nonempty("xmi:id").or_else(|| element.attr_nonempty("xmi.id"))
}

fn describe(element: &Element) -> String {
    match document_id(element) {
        Some(id) => format!("{} {id}", xmi_type(element).unwrap_or(&element.name)),
        None => xmi_type(element).unwrap_or(&element.name).to_string(),
    }
}

/// Document id given to the intermediate class of an association class
fn construct_class_id(association: &str) -> String {
    format!("{association}_class")
}

/// Fragment after the `#` that ends the document URI of an href, e.g. a
/// primitive type reference
fn href_fragment(element: &Element) -> Option<&str> {
    element
        .attr("href")
        .and_then(|href| href.split_once('#'))
        .map(|(_, fragment)| fragment)
        .filter(|f| !f.is_empty())
}

#[derive(Default)]
struct Decoder {
    plan: ImportPlan,
    class_ids: HashSet<String>,
    /// Ids of association classes
    construct_ids: HashSet<String>,
}

impl Decoder {
    fn issue(&mut self, issue: ImportIssue) {
        warn!(%issue, "import");
        self.plan.issues.push(issue);
    }

    fn require<'e>(&mut self, element: &'e Element, attribute: &'static str) -> Option<&'e str> {
        let value = element.attr_nonempty(attribute);
        if value.is_none() {
            self.issue(ImportIssue::MissingAttribute { element: describe(element), attribute });
        }
        value
    }

    /// Like [`Self::require`], but an empty value is accepted
    fn require_present<'e>(&mut self, element: &'e Element, attribute: &'static str) -> Option<&'e str> {
        let value = element.attr(attribute);
        if value.is_none() {
            self.issue(ImportIssue::MissingAttribute { element: describe(element), attribute });
        }
        value
    }

    fn finish(self) -> ImportPlan {
        self.plan
    }

    // ---- classes ----

    fn class_element(&mut self, element: &Element) {
        if xmi_type(element) == Some("uml:AssociationClass") || element.name == "UML:AssociationClass" {
            self.association_class_id(element);
            return;
        }
        let class = if xmi_type(element) == Some("uml:Class") {
            self.xmi_class(element)
        } else if element.name == "UML:Class" {
            self.legacy_class(element)
        } else {
            return;
        };
        let Some(class) = class else { return };

        if self.construct_ids.contains(&class.document_id) || !self.class_ids.insert(class.document_id.clone()) {
            self.issue(ImportIssue::DuplicateId { element: describe(element), id: class.document_id });
            return;
        }
        self.plan.classes.push(class);
    }

    fn association_class_id(&mut self, element: &Element) {
        let Some(id) = document_id(element) else { return };
        if self.class_ids.contains(id) || !self.construct_ids.insert(id.to_string()) {
            self.issue(ImportIssue::DuplicateId { element: describe(element), id: id.to_string() });
        }
    }

    fn xmi_class(&mut self, element: &Element) -> Option<PlannedClass> {
        let document_id = self.require(element, "xmi:id")?.to_string();
        let name = self.require_present(element, "name")?.to_string();
        Some(PlannedClass {
            document_id,
            name,
            attributes: xmi_attributes(element),
            methods: xmi_operations(element),
        })
    }

    fn legacy_class(&mut self, element: &Element) -> Option<PlannedClass> {
        let name = element.attr("name").unwrap_or_default();
        if name == ROOT_PLACEHOLDER {
            return None;
        }
        let document_id = self.require(element, "xmi.id")?.to_string();
        let name = self.require_present(element, "name")?.to_string();
        Some(PlannedClass {
            document_id,
            name,
            attributes: legacy_attributes(element),
            methods: legacy_operations(element),
        })
    }

    // ---- relationships ----

    fn relationship_element(&mut self, element: &Element) {
        if matches!(xmi_type(element), Some("uml:Class" | "uml:AssociationClass")) {
            for generalization in element
                .children
                .iter()
                .filter(|c| xmi_type(c) == Some("uml:Generalization") || c.name == "generalization")
            {
                self.nested_generalization(element, generalization);
            }
        }
        let relationship = match (xmi_type(element), element.name.as_str()) {
            (Some("uml:Class"), _) => return,
            (Some("uml:Association"), _) => self.xmi_association(element, false),
            (Some("uml:AssociationClass"), _) => self.xmi_association(element, true),
            (Some("uml:Dependency"), _) => self.xmi_dependency(element),
            (Some("uml:Generalization"), "packagedElement") => self.standalone_generalization(element),
            (_, "UML:Association") => self.legacy_association(element, false),
            (_, "UML:AssociationClass") => self.legacy_association(element, true),
            (_, "UML:Generalization") => self.legacy_generalization(element),
            (_, "UML:Dependency") => self.pair(element, "client", "supplier", LinkType::Dependency),
            (_, "UML:Composition") => self.pair(element, "whole", "part", LinkType::Composition),
            (_, "UML:Aggregation") => self.pair(element, "whole", "part", LinkType::Aggregation),
            _ => return,
        };
        if let Some(relationship) = relationship {
            self.push_relationship(element, relationship);
        }
    }

    fn push_relationship(&mut self, element: &Element, mut relationship: PlannedRelationship) {
        let link = relationship.link_mut();
        for end in [&mut link.source, &mut link.target] {
            if self.class_ids.contains(end.as_str()) {
                continue;
            }
            if self.construct_ids.contains(end.as_str()) {
                let class = construct_class_id(end);
                *end = class;
                continue;
            }
            let id = end.clone();
            self.issue(ImportIssue::UnknownEndpoint { element: describe(element), id });
            return;
        }
        self.plan.relationships.push(relationship);
    }

    fn nested_generalization(&mut self, class: &Element, generalization: &Element) {
        let Some(specific) = document_id(class) else { return };
        let Some(general) = self.require(generalization, "general") else { return };
        let mut link = PlannedLink::new(specific, general, LinkType::Generalization);
        link.document_id = document_id(generalization).map(str::to_string);
        self.push_relationship(generalization, PlannedRelationship::Link(link));
    }

    fn standalone_generalization(&mut self, element: &Element) -> Option<PlannedRelationship> {
        let specific = self.require(element, "specific")?;
        let general = self.require(element, "general")?;
        let mut link = PlannedLink::new(specific, general, LinkType::Generalization);
        link.document_id = document_id(element).map(str::to_string);
        Some(PlannedRelationship::Link(link))
    }

    fn legacy_generalization(&mut self, element: &Element) -> Option<PlannedRelationship> {
        // Older exporters use child/parent instead of subtype/supertype
        let (sub, sup) = if element.attr_nonempty("subtype").is_some() {
            ("subtype", "supertype")
        } else {
            ("child", "parent")
        };
        self.pair(element, sub, sup, LinkType::Generalization)
    }

    fn xmi_dependency(&mut self, element: &Element) -> Option<PlannedRelationship> {
        let reference = |name: &str| {
            element
                .attr_nonempty(name)
                .or_else(|| element.child(name).and_then(|c| c.attr_nonempty("xmi:idref")))
                .map(str::to_string)
        };
        let (Some(client), Some(supplier)) = (reference("client"), reference("supplier")) else {
            let attribute = if reference("client").is_none() { "client" } else { "supplier" };
            self.issue(ImportIssue::MissingAttribute { element: describe(element), attribute });
            return None;
        };
        let mut link = PlannedLink::new(client, supplier, LinkType::Dependency);
        link.document_id = document_id(element).map(str::to_string);
        Some(PlannedRelationship::Link(link))
    }

    /// Relationship whose two endpoints are plain attributes
    fn pair(
        &mut self,
        element: &Element,
        source: &'static str,
        target: &'static str,
        link_type: LinkType,
    ) -> Option<PlannedRelationship> {
        let source = self.require(element, source)?;
        let target = self.require(element, target)?;
        let mut link = PlannedLink::new(source, target, link_type);
        link.document_id = document_id(element).map(str::to_string);
        Some(PlannedRelationship::Link(link))
    }

    fn xmi_association(&mut self, element: &Element, with_class: bool) -> Option<PlannedRelationship> {
        let ends: Vec<&Element> = element.children_named("ownedEnd").collect();
        let ends = self.two_ends(element, &ends)?;
        let parsed = [self.xmi_end(element, ends[0])?, self.xmi_end(element, ends[1])?];
        let link = assemble(element, parsed);

        if !with_class {
            return Some(PlannedRelationship::Link(link));
        }
        self.construct(element, link, xmi_attributes(element), xmi_operations(element))
    }

    fn legacy_association(&mut self, element: &Element, with_class: bool) -> Option<PlannedRelationship> {
        let ends: Vec<&Element> = element
            .descendants()
            .filter(|e| e.name == "UML:AssociationEnd")
            .collect();
        let ends = self.two_ends(element, &ends)?;
        let parsed = [self.legacy_end(element, ends[0])?, self.legacy_end(element, ends[1])?];
        let link = assemble(element, parsed);

        if !with_class {
            return Some(PlannedRelationship::Link(link));
        }
        self.construct(element, link, legacy_attributes(element), legacy_operations(element))
    }

    fn two_ends<'e>(&mut self, element: &Element, ends: &[&'e Element]) -> Option<[&'e Element; 2]> {
        match ends {
            [first, second, ..] => Some([*first, *second]),
            _ => {
                self.issue(ImportIssue::MissingEnds { element: describe(element), found: ends.len() });
                None
            }
        }
    }

    fn xmi_end(&mut self, owner: &Element, end: &Element) -> Option<End> {
        let class = self.require(end, "type")?.to_string();
        let lower = end.child("lowerValue").and_then(|v| v.attr_nonempty("value"));
        let upper = end.child("upperValue").and_then(|v| v.attr_nonempty("value"));
        let multiplicity = match (lower, upper) {
            (None, None) => Ok(String::new()),
            // Omitted literals default to 1 in UML
            (lower, upper) => {
                Multiplicity::from_xmi(lower.unwrap_or("1"), upper.unwrap_or("1")).map(|m| m.to_string())
            }
        };
        let multiplicity = self.multiplicity(owner, multiplicity);
        Some(End { class, multiplicity, aggregation: aggregation_kind(end.attr("aggregation")) })
    }

    fn legacy_end(&mut self, owner: &Element, end: &Element) -> Option<End> {
        let class = end
            .attr_nonempty("type")
            .or_else(|| end.attr_nonempty("participant"))
            .map(str::to_string);
        let Some(class) = class else {
            self.issue(ImportIssue::MissingAttribute { element: describe(end), attribute: "type" });
            return None;
        };
        let multiplicity = match end.attr_nonempty("multiplicity") {
            Some(text) => Multiplicity::parse(text).map(|m| m.to_string()),
            None => Ok(String::new()),
        };
        let multiplicity = self.multiplicity(owner, multiplicity);
        Some(End { class, multiplicity, aggregation: aggregation_kind(end.attr("aggregation")) })
    }

    fn multiplicity(
        &mut self,
        owner: &Element,
        parsed: Result<String, umlsync_core::MultiplicityError>,
    ) -> String {
        parsed.unwrap_or_else(|source| {
            self.issue(ImportIssue::Multiplicity { element: describe(owner), source });
            String::new()
        })
    }

    fn construct(
        &mut self,
        element: &Element,
        mut link: PlannedLink,
        attributes: Vec<String>,
        methods: Vec<String>,
    ) -> Option<PlannedRelationship> {
        let Some(association) = link.document_id.clone() else {
            self.issue(ImportIssue::MissingAttribute { element: describe(element), attribute: "xmi:id" });
            return None;
        };
        link.link_type = LinkType::Intermediate;
        let class = PlannedClass {
            document_id: construct_class_id(&association),
            name: element.attr_nonempty("name").unwrap_or("AssociationClass").to_string(),
            attributes,
            methods,
        };
        Some(PlannedRelationship::Construct { link, class })
    }
}

struct End {
    class: String,
    multiplicity: String,
    aggregation: Option<LinkType>,
}

/// Build the link from two ends. The end carrying the aggregation kind is
/// the whole and becomes the source.
fn assemble(element: &Element, ends: [End; 2]) -> PlannedLink {
    let [first, second] = ends;
    let (source, target, link_type) = match (first.aggregation, second.aggregation) {
        (Some(kind), _) => (first, second, kind),
        (None, Some(kind)) => (second, first, kind),
        (None, None) => (first, second, LinkType::Association),
    };
    PlannedLink {
        document_id: document_id(element).map(str::to_string),
        source: source.class,
        target: target.class,
        link_type,
        source_multiplicity: source.multiplicity,
        target_multiplicity: target.multiplicity,
    }
}

fn aggregation_kind(value: Option<&str>) -> Option<LinkType> {
    match value?.trim() {
        "composite" => Some(LinkType::Composition),
        "shared" | "aggregate" => Some(LinkType::Aggregation),
        _ => None,
    }
}

fn xmi_attributes(element: &Element) -> Vec<String> {
    element
        .children_named("ownedAttribute")
        // Navigable association ends show up as attributes in some tools
        .filter(|a| a.attr("association").is_none())
        .map(|a| {
            let name = a.attr("name").unwrap_or_default();
            let kind = a
                .attr_nonempty("type")
                .or_else(|| a.child("type").and_then(href_fragment))
                .unwrap_or_default();
            Descriptor::new(name.trim(), kind).to_string()
        })
        .collect()
}

fn xmi_operations(element: &Element) -> Vec<String> {
    element
        .children_named("ownedOperation")
        .map(|op| {
            let name = op.attr("name").unwrap_or_default();
            let kind = op
                .children_named("ownedParameter")
                .find(|p| p.attr("direction") == Some("return"))
                .and_then(|p| p.attr_nonempty("type").or_else(|| p.child("type").and_then(href_fragment)))
                .unwrap_or_default();
            Descriptor::new(name.trim(), kind).to_string()
        })
        .collect()
}

fn legacy_attributes(element: &Element) -> Vec<String> {
    element
        .descendants()
        .filter(|e| e.name == "UML:Attribute")
        .map(|a| Descriptor::new(a.attr("name").unwrap_or_default().trim(), a.attr("type").unwrap_or_default().trim()).to_string())
        .collect()
}

fn legacy_operations(element: &Element) -> Vec<String> {
    element
        .descendants()
        .filter(|e| e.name == "UML:Operation")
        .map(|op| {
            let kind = op.attr_nonempty("returnType").unwrap_or("void");
            Descriptor::new(op.attr("name").unwrap_or_default().trim(), kind).to_string()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORDER_CUSTOMER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xmi:XMI xmi:version="2.0" xmlns:xmi="http://www.omg.org/XMI" xmlns:uml="http://www.eclipse.org/uml2/5.0.0/UML">
  <uml:Model xmi:id="root_model" name="RootModel">
    <packagedElement xmi:type="uml:Class" xmi:id="c1" name="Order">
      <ownedAttribute xmi:type="uml:Property" xmi:id="c1_id" name="id" type="int"/>
      <ownedOperation xmi:type="uml:Operation" xmi:id="c1_total" name="total()">
        <ownedParameter xmi:type="uml:Parameter" direction="return">
          <type xmi:type="uml:PrimitiveType" href="pathmap://UML_LIBRARIES/UMLPrimitiveTypes.library.uml#Real"/>
        </ownedParameter>
      </ownedOperation>
    </packagedElement>
    <packagedElement xmi:type="uml:Class" xmi:id="c2" name="Customer"/>
    <packagedElement xmi:type="uml:Association" xmi:id="a1" name="association">
      <memberEnd xmi:idref="a1_source"/>
      <memberEnd xmi:idref="a1_target"/>
      <ownedEnd xmi:id="a1_source" type="c1" association="a1">
        <lowerValue xmi:type="uml:LiteralInteger" value="1"/>
        <upperValue xmi:type="uml:LiteralUnlimitedNatural" value="1"/>
      </ownedEnd>
      <ownedEnd xmi:id="a1_target" type="c2" association="a1">
        <lowerValue xmi:type="uml:LiteralInteger" value="0"/>
        <upperValue xmi:type="uml:LiteralUnlimitedNatural" value="-1"/>
      </ownedEnd>
    </packagedElement>
  </uml:Model>
</xmi:XMI>"#;

    #[test]
    fn decodes_classes_and_association() {
        let plan = decode(ORDER_CUSTOMER).unwrap();
        assert!(plan.is_clean(), "{:?}", plan.issues);
        assert_eq!(plan.classes.len(), 2);

        let order = plan.class_named("Order").unwrap();
        assert_eq!(order.attributes, vec!["id: int"]);
        assert_eq!(order.methods, vec!["total(): Real"]);

        let links: Vec<_> = plan.links().collect();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].link_type, LinkType::Association);
        assert_eq!(links[0].source, "c1");
        assert_eq!(links[0].target, "c2");
        assert_eq!(links[0].source_multiplicity, "1..1");
        assert_eq!(links[0].target_multiplicity, "0..*");
    }

    #[test]
    fn aggregation_on_second_end_becomes_source() {
        let doc = r#"<uml:Model>
  <packagedElement xmi:type="uml:Class" xmi:id="car" name="Car"/>
  <packagedElement xmi:type="uml:Class" xmi:id="wheel" name="Wheel"/>
  <packagedElement xmi:type="uml:Association" xmi:id="a">
    <ownedEnd xmi:id="a_1" type="wheel"/>
    <ownedEnd xmi:id="a_2" type="car" aggregation="composite"/>
  </packagedElement>
</uml:Model>"#;
        let plan = decode(doc).unwrap();
        let link = plan.links().next().unwrap();
        assert_eq!(link.link_type, LinkType::Composition);
        assert_eq!((link.source.as_str(), link.target.as_str()), ("car", "wheel"));
    }

    #[test]
    fn legacy_dialect() {
        let doc = r#"<XMI xmi.version="1.1">
  <XMI.content>
    <UML:Model name="EA Model" xmi.id="m">
      <UML:Namespace.ownedElement>
        <UML:Class name="EARootClass" xmi.id="root"/>
        <UML:Class name="Shape" xmi.id="s">
          <UML:Classifier.feature>
            <UML:Attribute name="area" type="double"/>
            <UML:Operation name="draw()"/>
          </UML:Classifier.feature>
        </UML:Class>
        <UML:Class name="Circle" xmi.id="c"/>
        <UML:Class name="Canvas" xmi.id="v"/>
        <UML:Generalization subtype="c" supertype="s" xmi.id="g"/>
        <UML:Composition whole="v" part="s"/>
        <UML:Dependency client="v" supplier="ghost"/>
        <UML:Association xmi.id="a">
          <UML:Association.connection>
            <UML:AssociationEnd type="v" multiplicity="1"/>
            <UML:AssociationEnd type="c" multiplicity="0..*" aggregation="aggregate"/>
          </UML:Association.connection>
        </UML:Association>
      </UML:Namespace.ownedElement>
    </UML:Model>
  </XMI.content>
</XMI>"#;
        let plan = decode(doc).unwrap();
        let names: Vec<_> = plan.classes.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Shape", "Circle", "Canvas"]);
        assert_eq!(plan.class("s").unwrap().methods, vec!["draw(): void"]);

        let links: Vec<_> = plan.links().map(|l| (l.link_type, l.source.as_str(), l.target.as_str())).collect();
        assert_eq!(
            links,
            vec![
                (LinkType::Generalization, "c", "s"),
                (LinkType::Composition, "v", "s"),
                (LinkType::Aggregation, "c", "v"),
            ]
        );
        let aggregation = plan.links().nth(2).unwrap();
        assert_eq!(aggregation.source_multiplicity, "0..*");
        assert_eq!(aggregation.target_multiplicity, "1..1");

        assert_eq!(
            plan.issues,
            vec![ImportIssue::UnknownEndpoint { element: "UML:Dependency".into(), id: "ghost".into() }]
        );
    }

    #[test]
    fn association_class_becomes_construct() {
        let doc = r#"<uml:Model>
  <packagedElement xmi:type="uml:Class" xmi:id="s" name="Student"/>
  <packagedElement xmi:type="uml:Class" xmi:id="c" name="Course"/>
  <packagedElement xmi:type="uml:AssociationClass" xmi:id="e" name="Enrollment">
    <ownedEnd xmi:id="e_source" type="s"><lowerValue value="0"/><upperValue value="-1"/></ownedEnd>
    <ownedEnd xmi:id="e_target" type="c"/>
    <ownedAttribute xmi:type="uml:Property" name="grade" type="char"/>
  </packagedElement>
</uml:Model>"#;
        let plan = decode(doc).unwrap();
        let (link, class) = plan.constructs().next().unwrap();
        assert_eq!(link.link_type, LinkType::Intermediate);
        assert_eq!(link.source_multiplicity, "0..*");
        assert_eq!(link.target_multiplicity, "");
        assert_eq!(class.name, "Enrollment");
        assert_eq!(class.attributes, vec!["grade: char"]);
        // The association class is not an ordinary class
        assert_eq!(plan.classes.len(), 2);
    }

    #[test]
    fn malformed_elements_are_skipped() {
        let doc = r#"<uml:Model>
  <packagedElement xmi:type="uml:Class" name="NoId"/>
  <packagedElement xmi:type="uml:Class" xmi:id="a" name="A"/>
  <packagedElement xmi:type="uml:Class" xmi:id="a" name="AAgain"/>
  <packagedElement xmi:type="uml:Association" xmi:id="x">
    <ownedEnd type="a"/>
  </packagedElement>
  <packagedElement xmi:type="uml:Association" xmi:id="y">
    <ownedEnd type="a"><lowerValue value="*"/></ownedEnd>
    <ownedEnd type="a"/>
  </packagedElement>
</uml:Model>"#;
        let plan = decode(doc).unwrap();
        assert_eq!(plan.classes.len(), 1);
        assert_eq!(plan.classes[0].name, "A");
        assert_eq!(plan.relationships.len(), 1);
        assert_eq!(plan.links().next().unwrap().source_multiplicity, "");

        assert!(matches!(plan.issues[0], ImportIssue::MissingAttribute { attribute: "xmi:id", .. }));
        assert!(matches!(plan.issues[1], ImportIssue::DuplicateId { .. }));
        assert!(matches!(plan.issues[2], ImportIssue::MissingEnds { found: 1, .. }));
        assert!(matches!(plan.issues[3], ImportIssue::Multiplicity { .. }));
    }

    #[test]
    fn type_names_keep_their_hash() {
        let doc = r##"<uml:Model>
  <packagedElement xmi:type="uml:Class" xmi:id="a" name="">
    <ownedAttribute name="key">
      <type href="pathmap://UML_LIBRARIES/UMLPrimitiveTypes.library.uml#Map#Entry"/>
    </ownedAttribute>
  </packagedElement>
</uml:Model>"##;
        let plan = decode(doc).unwrap();
        assert!(plan.is_clean(), "{:?}", plan.issues);
        assert_eq!(plan.classes[0].name, "");
        assert_eq!(plan.classes[0].attributes, vec!["key: Map#Entry"]);
    }

    #[test]
    fn relationships_attach_to_association_classes() {
        let doc = r#"<uml:Model>
  <packagedElement xmi:type="uml:Class" xmi:id="s" name="Student"/>
  <packagedElement xmi:type="uml:Class" xmi:id="c" name="Course"/>
  <packagedElement xmi:type="uml:Dependency" xmi:id="d">
    <client xmi:idref="s"/>
    <supplier xmi:idref="e"/>
  </packagedElement>
  <packagedElement xmi:type="uml:AssociationClass" xmi:id="e" name="Enrollment">
    <generalization xmi:type="uml:Generalization" xmi:id="g" general="c"/>
    <ownedEnd xmi:id="e_source" type="s"/>
    <ownedEnd xmi:id="e_target" type="c"/>
  </packagedElement>
</uml:Model>"#;
        let plan = decode(doc).unwrap();
        assert!(plan.is_clean(), "{:?}", plan.issues);
        let links: Vec<_> = plan.links().map(|l| (l.link_type, l.source.as_str(), l.target.as_str())).collect();
        assert_eq!(
            links,
            vec![
                (LinkType::Dependency, "s", "e_class"),
                (LinkType::Generalization, "e_class", "c"),
                (LinkType::Intermediate, "s", "c"),
            ]
        );
    }

    #[test]
    fn non_xml_fails() {
        assert!(matches!(decode("not a document"), Err(DecodeError::Xml(_))));
    }
}
