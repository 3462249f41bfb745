//! XMI 2.0 export of a diagram.
//!
//! Layout:
//! - one `uml:Class` per class, generalizations nested in the specific class
//! - `uml:Association` for association, aggregation and composition, the
//!   aggregation kind on the source (whole) end
//! - `uml:AssociationClass` for each intermediate construct, keyed by the
//!   direct link id and carrying the intermediate class members. Links that
//!   touch the intermediate class refer to it by that id.
//! - `uml:Dependency` with client (source) and supplier (target)

use std::collections::{HashMap, HashSet};
use std::fmt::{self, Write};

use thiserror::Error;
use tracing::{debug, warn};
use umlsync_core::{ConstructView, Descriptor, Diagram, DiagramClass, DiagramLink, DurableId, LinkType, Multiplicity};

use crate::xml::escape;

const XML_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;
const XMI_OPEN: &str = r#"<xmi:XMI xmi:version="2.0" xmlns:xmi="http://www.omg.org/XMI" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns:uml="http://www.eclipse.org/uml2/5.0.0/UML">"#;
const PRIMITIVE_TYPES: &str = "pathmap://UML_LIBRARIES/UMLPrimitiveTypes.library.uml#";

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("failed to format document: {0}")]
    Format(#[from] fmt::Error),
}

/// Something left out of the document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeWarning {
    BadMultiplicity { link: DurableId, value: String },
    DanglingEndpoint { link: DurableId, endpoint: DurableId },
    IncompleteConstruct { link: DurableId },
}

impl fmt::Display for EncodeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeWarning::BadMultiplicity { link, value } => {
                write!(f, "link {link}: multiplicity '{value}' omitted")
            }
            EncodeWarning::DanglingEndpoint { link, endpoint } => {
                write!(f, "link {link}: endpoint {endpoint} is not an exported class")
            }
            EncodeWarning::IncompleteConstruct { link } => {
                write!(f, "link {link}: association class without its association")
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Encoded {
    pub xml: String,
    pub warnings: Vec<EncodeWarning>,
}

/// Encode a diagram, logging anything that had to be left out
pub fn encode(diagram: &Diagram) -> Result<String, EncodeError> {
    let encoded = encode_with_report(diagram)?;
    for warning in &encoded.warnings {
        warn!(%warning, "export");
    }
    Ok(encoded.xml)
}

pub fn encode_with_report(diagram: &Diagram) -> Result<Encoded, EncodeError> {
    let mut encoder = Encoder::new(diagram);
    encoder.write_document()?;
    debug!(
        classes = encoder.exported.len(),
        warnings = encoder.warnings.len(),
        "encoded diagram"
    );
    Ok(Encoded { xml: encoder.out, warnings: encoder.warnings })
}

struct Encoder<'d> {
    diagram: &'d Diagram,
    constructs: Vec<ConstructView<'d>>,
    /// Ids of classes emitted as `uml:Class`
    exported: HashSet<&'d DurableId>,
    /// Intermediate class id to the id of its `uml:AssociationClass`
    aliases: HashMap<&'d DurableId, &'d DurableId>,
    out: String,
    warnings: Vec<EncodeWarning>,
}

impl<'d> Encoder<'d> {
    fn new(diagram: &'d Diagram) -> Self {
        let constructs: Vec<_> = diagram.constructs().collect();
        let aliases: HashMap<&DurableId, &DurableId> = constructs.iter().map(|c| (&c.class.id, &c.direct.id)).collect();
        let exported = diagram
            .classes
            .iter()
            .map(|c| &c.id)
            .filter(|id| !aliases.contains_key(id))
            .collect();
        Self { diagram, constructs, exported, aliases, out: String::new(), warnings: Vec::new() }
    }

    /// Document id a class endpoint is written as
    fn reference(&self, class: &DurableId) -> Option<&'d DurableId> {
        let diagram = self.diagram;
        if self.exported.contains(class) {
            return diagram.class(class).map(|c| &c.id);
        }
        self.aliases.get(class).copied()
    }

    fn write_document(&mut self) -> fmt::Result {
        writeln!(self.out, "{XML_HEADER}")?;
        writeln!(self.out, "{XMI_OPEN}")?;
        writeln!(self.out, r#"  <uml:Model xmi:id="root_model" name="RootModel">"#)?;

        let diagram = self.diagram;
        let classes: Vec<&'d DiagramClass> =
            diagram.classes.iter().filter(|c| self.exported.contains(&c.id)).collect();
        for class in classes {
            self.write_class(class)?;
        }

        for link in &diagram.links {
            if link.is_dashed() {
                if diagram.link(link.source.id()).is_none() {
                    self.warnings.push(EncodeWarning::IncompleteConstruct { link: link.id.clone() });
                }
                continue;
            }
            if let Some(construct) = self.constructs.iter().find(|c| c.direct.id == link.id).copied() {
                self.write_association_class(construct)?;
                continue;
            }
            match link.link_type {
                LinkType::Generalization => {
                    // Written inside the specific class; only report what got lost
                    self.check_endpoints(link);
                }
                LinkType::Dependency => self.write_dependency(link)?,
                LinkType::Association | LinkType::Aggregation | LinkType::Composition => self.write_association(link)?,
                LinkType::Intermediate => {
                    self.warnings.push(EncodeWarning::IncompleteConstruct { link: link.id.clone() });
                }
            }
        }

        writeln!(self.out, "  </uml:Model>")?;
        write!(self.out, "</xmi:XMI>")
    }

    /// Document ids of both endpoints; records a warning when one is not a
    /// class of the document
    fn check_endpoints(&mut self, link: &DiagramLink) -> Option<[&'d DurableId; 2]> {
        let mut resolved = [None, None];
        for (slot, end) in resolved.iter_mut().zip([&link.source, &link.target]) {
            *slot = end.as_class().and_then(|id| self.reference(id));
            if slot.is_none() {
                self.warnings.push(EncodeWarning::DanglingEndpoint {
                    link: link.id.clone(),
                    endpoint: end.id().clone(),
                });
                return None;
            }
        }
        match resolved {
            [Some(source), Some(target)] => Some([source, target]),
            _ => None,
        }
    }

    fn write_class(&mut self, class: &DiagramClass) -> fmt::Result {
        let id = escape(class.id.as_str());
        writeln!(
            self.out,
            r#"    <packagedElement xmi:type="uml:Class" xmi:id="{id}" name="{}">"#,
            escape(&class.name)
        )?;
        self.write_generalizations(class)?;
        self.write_members(class)?;
        writeln!(self.out, "    </packagedElement>")
    }

    /// Generalizations whose specific end is `class`, nested in its element
    fn write_generalizations(&mut self, class: &DiagramClass) -> fmt::Result {
        let diagram = self.diagram;
        for link in diagram
            .links
            .iter()
            .filter(|l| l.link_type == LinkType::Generalization && l.source.as_class() == Some(&class.id))
        {
            let Some(general) = link.target.as_class().and_then(|t| self.reference(t)) else {
                continue;
            };
            writeln!(
                self.out,
                r#"      <generalization xmi:type="uml:Generalization" xmi:id="{}" general="{}"/>"#,
                escape(link.id.as_str()),
                escape(general.as_str())
            )?;
        }
        Ok(())
    }

    fn write_members(&mut self, class: &DiagramClass) -> fmt::Result {
        let owner = class.id.as_str();
        for attribute in &class.attributes {
            let d = Descriptor::parse(attribute);
            writeln!(
                self.out,
                r#"      <ownedAttribute xmi:type="uml:Property" xmi:id="{}" name="{}" type="{}"/>"#,
                escape(&format!("{owner}_{}", d.name)),
                escape(&d.name),
                escape(&d.kind)
            )?;
        }
        for method in &class.methods {
            let d = Descriptor::parse(method);
            let op_id = escape(&format!("{owner}_{}", d.name)).into_owned();
            if d.kind.is_empty() {
                writeln!(
                    self.out,
                    r#"      <ownedOperation xmi:type="uml:Operation" xmi:id="{op_id}" name="{}"/>"#,
                    escape(&d.name)
                )?;
                continue;
            }
            writeln!(
                self.out,
                r#"      <ownedOperation xmi:type="uml:Operation" xmi:id="{op_id}" name="{}">"#,
                escape(&d.name)
            )?;
            writeln!(self.out, r#"        <ownedParameter xmi:type="uml:Parameter" direction="return">"#)?;
            writeln!(
                self.out,
                r#"          <type xmi:type="uml:PrimitiveType" href="{PRIMITIVE_TYPES}{}"/>"#,
                escape(&d.kind)
            )?;
            writeln!(self.out, "        </ownedParameter>")?;
            writeln!(self.out, "      </ownedOperation>")?;
        }
        Ok(())
    }

    fn write_association(&mut self, link: &DiagramLink) -> fmt::Result {
        let Some(ends) = self.check_endpoints(link) else {
            return Ok(());
        };
        let aggregation = match link.link_type {
            LinkType::Composition => Some("composite"),
            LinkType::Aggregation => Some("shared"),
            _ => None,
        };
        writeln!(
            self.out,
            r#"    <packagedElement xmi:type="uml:Association" xmi:id="{}" name="{}">"#,
            escape(link.id.as_str()),
            link.link_type
        )?;
        self.write_ends(link, ends, aggregation)?;
        writeln!(self.out, "    </packagedElement>")
    }

    fn write_association_class(&mut self, construct: ConstructView<'d>) -> fmt::Result {
        let link = construct.direct;
        let Some(ends) = self.check_endpoints(link) else {
            return Ok(());
        };
        writeln!(
            self.out,
            r#"    <packagedElement xmi:type="uml:AssociationClass" xmi:id="{}" name="{}">"#,
            escape(link.id.as_str()),
            escape(&construct.class.name)
        )?;
        self.write_ends(link, ends, None)?;
        self.write_generalizations(construct.class)?;
        self.write_members(construct.class)?;
        writeln!(self.out, "    </packagedElement>")
    }

    fn write_ends(
        &mut self,
        link: &DiagramLink,
        [source, target]: [&DurableId; 2],
        source_aggregation: Option<&str>,
    ) -> fmt::Result {
        let id = escape(link.id.as_str()).into_owned();
        writeln!(self.out, r#"      <memberEnd xmi:idref="{id}_source"/>"#)?;
        writeln!(self.out, r#"      <memberEnd xmi:idref="{id}_target"/>"#)?;

        let ends = [
            ("source", source, &link.source_multiplicity, source_aggregation),
            ("target", target, &link.target_multiplicity, None),
        ];
        for (role, endpoint, multiplicity, aggregation) in ends {
            let aggregation = aggregation.map(|a| format!(r#" aggregation="{a}""#)).unwrap_or_default();
            writeln!(
                self.out,
                r#"      <ownedEnd xmi:id="{id}_{role}" type="{}" association="{id}"{aggregation}>"#,
                escape(endpoint.as_str())
            )?;
            if let Some(m) = self.multiplicity(link, multiplicity) {
                writeln!(self.out, r#"        <lowerValue xmi:type="uml:LiteralInteger" value="{}"/>"#, m.lower)?;
                writeln!(
                    self.out,
                    r#"        <upperValue xmi:type="uml:LiteralUnlimitedNatural" value="{}"/>"#,
                    m.upper.to_xmi()
                )?;
            }
            writeln!(self.out, "      </ownedEnd>")?;
        }
        Ok(())
    }

    fn multiplicity(&mut self, link: &DiagramLink, value: &str) -> Option<Multiplicity> {
        if value.trim().is_empty() {
            return None;
        }
        match Multiplicity::parse(value) {
            Ok(m) => Some(m),
            Err(_) => {
                self.warnings.push(EncodeWarning::BadMultiplicity {
                    link: link.id.clone(),
                    value: value.to_string(),
                });
                None
            }
        }
    }

    fn write_dependency(&mut self, link: &DiagramLink) -> fmt::Result {
        let Some([client, supplier]) = self.check_endpoints(link) else {
            return Ok(());
        };
        writeln!(
            self.out,
            r#"    <packagedElement xmi:type="uml:Dependency" xmi:id="{}">"#,
            escape(link.id.as_str())
        )?;
        writeln!(self.out, r#"      <client xmi:idref="{}"/>"#, escape(client.as_str()))?;
        writeln!(self.out, r#"      <supplier xmi:idref="{}"/>"#, escape(supplier.as_str()))?;
        writeln!(self.out, "    </packagedElement>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use umlsync_core::{Endpoint, NewClass};

    fn class(id: &str, name: &str, attributes: &[&str], methods: &[&str]) -> DiagramClass {
        NewClass::new(name)
            .with_attributes(attributes.iter().map(|s| s.to_string()).collect())
            .with_methods(methods.iter().map(|s| s.to_string()).collect())
            .into_class(id.into())
    }

    fn link(id: &str, source: Endpoint, target: &str, link_type: LinkType, sm: &str, tm: &str) -> DiagramLink {
        DiagramLink {
            id: id.into(),
            source,
            target: Endpoint::Class(target.into()),
            link_type,
            source_multiplicity: sm.into(),
            target_multiplicity: tm.into(),
        }
    }

    fn order_customer() -> Diagram {
        Diagram {
            id: None,
            classes: vec![
                class("o", "Order", &["id: int"], &["+ total(): Money"]),
                class("c", "Customer", &["name: String"], &[]),
            ],
            links: vec![link("l1", Endpoint::Class("o".into()), "c", LinkType::Association, "1..1", "0..*")],
        }
    }

    #[test]
    fn writes_header_and_model() {
        let xml = encode(&Diagram::default()).unwrap();
        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(xml.contains(r#"<uml:Model xmi:id="root_model" name="RootModel">"#));
        assert!(xml.ends_with("</xmi:XMI>"));
    }

    #[test]
    fn association_ends_carry_multiplicities() {
        let xml = encode(&order_customer()).unwrap();
        assert!(xml.contains(r#"<packagedElement xmi:type="uml:Class" xmi:id="o" name="Order">"#));
        assert!(xml.contains(r#"<ownedAttribute xmi:type="uml:Property" xmi:id="o_id" name="id" type="int"/>"#));
        assert!(xml.contains(r#"href="pathmap://UML_LIBRARIES/UMLPrimitiveTypes.library.uml#Money""#));
        assert!(xml.contains(r#"<ownedEnd xmi:id="l1_target" type="c" association="l1">"#));
        assert!(xml.contains(r#"<upperValue xmi:type="uml:LiteralUnlimitedNatural" value="-1"/>"#));
    }

    #[test]
    fn composition_marks_source_end() {
        let mut d = order_customer();
        d.links[0].link_type = LinkType::Composition;
        let xml = encode(&d).unwrap();
        assert!(xml.contains(r#"<ownedEnd xmi:id="l1_source" type="o" association="l1" aggregation="composite">"#));
        assert!(xml.contains(r#"<ownedEnd xmi:id="l1_target" type="c" association="l1">"#));
    }

    #[test]
    fn generalization_is_nested_in_specific_class() {
        let mut d = order_customer();
        d.links = vec![link("g", Endpoint::Class("o".into()), "c", LinkType::Generalization, "", "")];
        let xml = encode(&d).unwrap();
        let class_start = xml.find(r#"xmi:id="o" name="Order">"#).unwrap();
        let generalization = xml
            .find(r#"<generalization xmi:type="uml:Generalization" xmi:id="g" general="c"/>"#)
            .unwrap();
        let class_end = xml[class_start..].find("</packagedElement>").unwrap() + class_start;
        assert!(class_start < generalization && generalization < class_end);
        assert!(!xml.contains("uml:Association"));
    }

    #[test]
    fn construct_becomes_one_association_class() {
        let mut d = order_customer();
        d.classes.push(class("i", "OrderLine", &["qty: int"], &[]));
        d.links[0].link_type = LinkType::Intermediate;
        d.links.push(link("dash", Endpoint::Link("l1".into()), "i", LinkType::Intermediate, "", ""));

        let xml = encode(&d).unwrap();
        assert!(xml.contains(r#"<packagedElement xmi:type="uml:AssociationClass" xmi:id="l1" name="OrderLine">"#));
        assert!(xml.contains(r#"xmi:id="l1_qty" name="qty" type="int""#));
        assert!(!xml.contains(r#"xmi:type="uml:Class" xmi:id="i""#));
        assert!(!xml.contains("dash"));
    }

    #[test]
    fn intermediate_class_is_referenced_through_its_association_class() {
        let mut d = order_customer();
        d.classes.push(class("i", "OrderLine", &[], &[]));
        d.links[0].link_type = LinkType::Intermediate;
        d.links.push(link("dash", Endpoint::Link("l1".into()), "i", LinkType::Intermediate, "", ""));
        d.links.push(link("g", Endpoint::Class("i".into()), "c", LinkType::Generalization, "", ""));
        d.links.push(link("a2", Endpoint::Class("c".into()), "i", LinkType::Aggregation, "1..1", ""));

        let encoded = encode_with_report(&d).unwrap();
        assert!(encoded.warnings.is_empty(), "{:?}", encoded.warnings);
        let xml = encoded.xml;
        let start = xml.find(r#"xmi:type="uml:AssociationClass" xmi:id="l1""#).unwrap();
        let end = xml[start..].find("</packagedElement>").unwrap() + start;
        let nested = xml.find(r#"xmi:id="g" general="c"/>"#).unwrap();
        assert!(start < nested && nested < end);
        assert!(xml.contains(r#"<ownedEnd xmi:id="a2_target" type="l1" association="a2">"#));
    }

    #[test]
    fn stray_intermediate_link_is_reported() {
        let mut d = order_customer();
        d.links[0].link_type = LinkType::Intermediate;
        let encoded = encode_with_report(&d).unwrap();
        assert_eq!(encoded.warnings, vec![EncodeWarning::IncompleteConstruct { link: "l1".into() }]);
        assert!(!encoded.xml.contains("uml:Association"));
    }

    #[test]
    fn bad_multiplicity_is_reported_and_omitted() {
        let mut d = order_customer();
        d.links[0].target_multiplicity = "*".into();
        let encoded = encode_with_report(&d).unwrap();
        assert_eq!(
            encoded.warnings,
            vec![EncodeWarning::BadMultiplicity { link: "l1".into(), value: "*".into() }]
        );
        assert_eq!(encoded.xml.matches("upperValue").count(), 1);
    }

    #[test]
    fn names_are_escaped() {
        let d = Diagram {
            id: None,
            classes: vec![class("x", "Map<K, V>", &["entries: List<\"E\">"], &[])],
            links: vec![],
        };
        let xml = encode(&d).unwrap();
        assert!(xml.contains(r#"name="Map&lt;K, V&gt;""#));
        assert!(xml.contains(r#"type="List&lt;&quot;E&quot;&gt;""#));
    }

    #[test]
    fn dependency_lists_client_and_supplier() {
        let mut d = order_customer();
        d.links = vec![link("dep", Endpoint::Class("o".into()), "c", LinkType::Dependency, "", "")];
        let xml = encode(&d).unwrap();
        assert!(xml.contains(r#"<client xmi:idref="o"/>"#));
        assert!(xml.contains(r#"<supplier xmi:idref="c"/>"#));
    }
}
