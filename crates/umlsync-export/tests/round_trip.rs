use proptest::prelude::*;
use umlsync_core::{Diagram, DiagramClass, DiagramLink, Endpoint, LinkType, Multiplicity, NewClass, Upper};
use umlsync_export::{ImportPlan, decode, encode, encode_with_report};

type LinkKey = (LinkType, String, String, String, String);

fn multiplicity() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        (0u32..5, 0u32..5, any::<bool>()).prop_map(|(lower, span, unbounded)| {
            let upper = if unbounded { Upper::Unbounded } else { Upper::Bounded(lower + span) };
            Multiplicity { lower, upper }.to_string()
        }),
    ]
}

fn class_content() -> impl Strategy<Value = (String, Vec<String>, Vec<String>)> {
    let attribute = ("[a-z][a-z0-9_]{0,6}", "[A-Z][A-Za-z<>&]{0,6}").prop_map(|(n, t)| format!("{n}: {t}"));
    let method = ("[a-z][a-z0-9]{0,6}", "[A-Z][A-Za-z]{0,6}").prop_map(|(n, t)| format!("+ {n}(): {t}"));
    (
        "[A-Z][a-zA-Z]{0,8}",
        proptest::collection::vec(attribute, 0..4),
        proptest::collection::vec(method, 0..3),
    )
}

fn link_kind() -> impl Strategy<Value = LinkType> {
    prop_oneof![
        Just(LinkType::Association),
        Just(LinkType::Composition),
        Just(LinkType::Aggregation),
        Just(LinkType::Generalization),
        Just(LinkType::Dependency),
    ]
}

fn diagram() -> impl Strategy<Value = Diagram> {
    let classes = proptest::collection::vec(class_content(), 2..6);
    let links = proptest::collection::vec((any::<prop::sample::Index>(), any::<prop::sample::Index>(), link_kind(), multiplicity(), multiplicity()), 0..6);
    let construct = proptest::option::of((any::<prop::sample::Index>(), any::<prop::sample::Index>(), class_content(), multiplicity()));
    // A relationship between an ordinary class and the intermediate class
    let attached = proptest::option::of((any::<prop::sample::Index>(), link_kind(), any::<bool>(), multiplicity()));

    (classes, links, construct, attached).prop_map(|(classes, links, construct, attached)| {
        let mut diagram = Diagram::default();
        for (i, (name, attributes, methods)) in classes.into_iter().enumerate() {
            let class = NewClass::new(name).with_attributes(attributes).with_methods(methods);
            diagram.classes.push(class.into_class(format!("c{i}").as_str().into()));
        }
        let count = diagram.classes.len();
        let class_id = |idx: &prop::sample::Index| Endpoint::Class(format!("c{}", idx.index(count)).as_str().into());

        for (i, (s, t, link_type, sm, tm)) in links.into_iter().enumerate() {
            let (sm, tm) = if link_type.has_multiplicities() { (sm, tm) } else { (String::new(), String::new()) };
            diagram.links.push(DiagramLink {
                id: format!("l{i}").as_str().into(),
                source: class_id(&s),
                target: class_id(&t),
                link_type,
                source_multiplicity: sm,
                target_multiplicity: tm,
            });
        }

        if let Some((s, t, (name, attributes, methods), sm)) = construct {
            let class: DiagramClass = NewClass::new(name)
                .with_attributes(attributes)
                .with_methods(methods)
                .into_class("mid".into());
            diagram.classes.push(class);
            diagram.links.push(DiagramLink {
                id: "direct".into(),
                source: class_id(&s),
                target: class_id(&t),
                link_type: LinkType::Intermediate,
                source_multiplicity: sm,
                target_multiplicity: String::new(),
            });
            diagram.links.push(DiagramLink {
                id: "dashed".into(),
                source: Endpoint::Link("direct".into()),
                target: Endpoint::Class("mid".into()),
                link_type: LinkType::Intermediate,
                source_multiplicity: String::new(),
                target_multiplicity: String::new(),
            });

            if let Some((other, link_type, from_mid, m)) = attached {
                let (source, target) = if from_mid {
                    (Endpoint::Class("mid".into()), class_id(&other))
                } else {
                    (class_id(&other), Endpoint::Class("mid".into()))
                };
                let m = if link_type.has_multiplicities() { m } else { String::new() };
                diagram.links.push(DiagramLink {
                    id: "attached".into(),
                    source,
                    target,
                    link_type,
                    source_multiplicity: m,
                    target_multiplicity: String::new(),
                });
            }
        }
        diagram
    })
}

/// The intermediate class comes back under the id of its association class
fn planned_id(id: &str) -> String {
    match id {
        "mid" => "direct_class".to_string(),
        other => other.to_string(),
    }
}

fn diagram_links(diagram: &Diagram) -> Vec<LinkKey> {
    let mut keys: Vec<LinkKey> = diagram
        .links
        .iter()
        .filter(|l| !l.is_dashed())
        .map(|l| {
            (
                l.link_type,
                planned_id(l.source.id().as_str()),
                planned_id(l.target.id().as_str()),
                l.source_multiplicity.clone(),
                l.target_multiplicity.clone(),
            )
        })
        .collect();
    keys.sort_by(|a, b| format!("{a:?}").cmp(&format!("{b:?}")));
    keys
}

fn plan_links(plan: &ImportPlan) -> Vec<LinkKey> {
    let mut keys: Vec<LinkKey> = plan
        .links()
        .map(|l| {
            (
                l.link_type,
                l.source.clone(),
                l.target.clone(),
                l.source_multiplicity.clone(),
                l.target_multiplicity.clone(),
            )
        })
        .collect();
    keys.sort_by(|a, b| format!("{a:?}").cmp(&format!("{b:?}")));
    keys
}

proptest! {
    #[test]
    fn decode_of_encode_preserves_semantics(diagram in diagram()) {
        let xml = encode(&diagram).unwrap();
        let plan = decode(&xml).unwrap();
        prop_assert!(plan.is_clean(), "{:?}", plan.issues);

        let constructs: Vec<_> = plan.constructs().collect();
        let intermediate = diagram.class(&"mid".into());
        prop_assert_eq!(constructs.len(), usize::from(intermediate.is_some()));

        for class in diagram.classes.iter().filter(|c| c.id.as_str() != "mid") {
            let planned = plan.class(class.id.as_str());
            prop_assert!(planned.is_some(), "missing class {}", class.id);
            let planned = planned.unwrap();
            prop_assert_eq!(&planned.name, &class.name);
            prop_assert_eq!(&planned.attributes, &class.attributes);
            prop_assert_eq!(&planned.methods, &class.methods);
        }
        if let (Some(mid), Some((_, planned))) = (intermediate, constructs.first()) {
            prop_assert_eq!(&planned.name, &mid.name);
            prop_assert_eq!(&planned.attributes, &mid.attributes);
            prop_assert_eq!(&planned.methods, &mid.methods);
        }

        prop_assert_eq!(plan_links(&plan), diagram_links(&diagram));
    }
}

#[test]
fn bare_integer_multiplicity_comes_back_as_range() {
    let mut diagram = Diagram::default();
    diagram.classes.push(NewClass::new("A").into_class("a".into()));
    diagram.classes.push(NewClass::new("B").into_class("b".into()));
    diagram.links.push(DiagramLink {
        id: "l".into(),
        source: Endpoint::Class("a".into()),
        target: Endpoint::Class("b".into()),
        link_type: LinkType::Association,
        source_multiplicity: "3".into(),
        target_multiplicity: "*".into(),
    });

    let plan = decode(&encode(&diagram).unwrap()).unwrap();
    let link = plan.links().next().unwrap();
    assert_eq!(link.source_multiplicity, "3..3");
    // '*' alone is not a multiplicity and is left out of the document
    assert_eq!(link.target_multiplicity, "");
}

fn student_course_enrollment() -> Diagram {
    let mut diagram = Diagram::default();
    for (id, name) in [("s", "Student"), ("c", "Course"), ("mid", "Enrollment"), ("g", "Grade")] {
        diagram.classes.push(NewClass::new(name).into_class(id.into()));
    }
    let link = |id: &str, source: Endpoint, target: &str, link_type: LinkType| DiagramLink {
        id: id.into(),
        source,
        target: Endpoint::Class(target.into()),
        link_type,
        source_multiplicity: String::new(),
        target_multiplicity: String::new(),
    };
    diagram.links.push(link("direct", Endpoint::Class("s".into()), "c", LinkType::Intermediate));
    diagram.links.push(link("dashed", Endpoint::Link("direct".into()), "mid", LinkType::Intermediate));
    diagram.links.push(link("dep", Endpoint::Class("g".into()), "mid", LinkType::Dependency));
    diagram
}

#[test]
fn links_to_the_intermediate_class_survive() {
    let diagram = student_course_enrollment();
    let encoded = encode_with_report(&diagram).unwrap();
    assert!(encoded.warnings.is_empty(), "{:?}", encoded.warnings);
    assert!(encoded.xml.contains(r#"<supplier xmi:idref="direct"/>"#));

    let plan = decode(&encoded.xml).unwrap();
    assert!(plan.is_clean(), "{:?}", plan.issues);
    let dependency = plan.links().find(|l| l.link_type == LinkType::Dependency).unwrap();
    assert_eq!((dependency.source.as_str(), dependency.target.as_str()), ("g", "direct_class"));
    let (_, class) = plan.constructs().next().unwrap();
    assert_eq!(class.document_id, "direct_class");
}

#[test]
fn unnamed_class_survives() {
    let mut diagram = Diagram::default();
    diagram.classes.push(NewClass::new("").into_class("e".into()));
    diagram.classes.push(NewClass::new("B").into_class("b".into()));
    diagram.links.push(DiagramLink {
        id: "l".into(),
        source: Endpoint::Class("e".into()),
        target: Endpoint::Class("b".into()),
        link_type: LinkType::Association,
        source_multiplicity: String::new(),
        target_multiplicity: String::new(),
    });

    let plan = decode(&encode(&diagram).unwrap()).unwrap();
    assert!(plan.is_clean(), "{:?}", plan.issues);
    assert_eq!(plan.class("e").unwrap().name, "");
    assert_eq!(plan.links().count(), 1);
}
