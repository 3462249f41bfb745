//! Replaying a decoded exchange document through the ordinary create path.

use std::collections::HashMap;

use thiserror::Error;
use tracing::{info, warn};
use umlsync_core::{CanvasGraph, ConstructSpec, DurableId, NewClass, Position};
use umlsync_export::{ImportIssue, ImportPlan, PlannedRelationship, decode, encode_with_report};

use super::SyncEngine;
use crate::error::SyncError;
use crate::store::ModelStore;

const GRID_COLUMNS: usize = 4;
const GRID_ORIGIN: Position = Position { x: 50.0, y: 50.0 };
const GRID_STEP_X: f64 = 260.0;
const GRID_STEP_Y: f64 = 180.0;

/// Where the `index`th imported class goes. Layout is not preserved by the
/// exchange format, so imports are laid out row by row.
pub fn grid_position(index: usize) -> Position {
    let column = (index % GRID_COLUMNS) as f64;
    let row = (index / GRID_COLUMNS) as f64;
    GRID_ORIGIN.offset(column * GRID_STEP_X, row * GRID_STEP_Y)
}

#[derive(Debug, Error)]
pub enum ImportError {
    /// The document itself had a problem with this element
    #[error(transparent)]
    Document(#[from] ImportIssue),
    #[error("{element}: endpoint '{id}' was not imported")]
    UnknownEndpoint { element: String, id: String },
    #[error("{element}: {error}")]
    Create {
        element: String,
        #[source]
        error: SyncError,
    },
}

#[derive(Debug, Default)]
pub struct ImportReport {
    pub classes_created: usize,
    pub links_created: usize,
    pub constructs_created: usize,
    pub errors: Vec<ImportError>,
}

impl ImportReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

impl<S: ModelStore, C: CanvasGraph> SyncEngine<S, C> {
    /// Create everything `plan` describes: every class first, then the
    /// association classes, then the other relationships, which may attach
    /// to an intermediate class. Elements that fail are reported and skipped.
    ///
    /// The diagram is not cleared first; imported elements are added to
    /// whatever is already there.
    pub async fn import(&mut self, plan: &ImportPlan) -> ImportReport {
        let mut report = ImportReport::default();
        report.errors.extend(plan.issues.iter().cloned().map(ImportError::Document));

        let mut created: HashMap<&str, DurableId> = HashMap::new();
        for (index, class) in plan.classes.iter().enumerate() {
            let request = NewClass::new(class.name.clone())
                .with_attributes(class.attributes.clone())
                .with_methods(class.methods.clone())
                .at(grid_position(index));
            match self.create_class(request).await {
                Ok(record) => {
                    created.insert(class.document_id.as_str(), record.id);
                    report.classes_created += 1;
                }
                Err(error) => {
                    warn!(class = %class.document_id, error = %error, "class not imported");
                    report.errors.push(ImportError::Create { element: class.document_id.clone(), error });
                }
            }
        }

        let (constructs, links): (Vec<_>, Vec<_>) = plan
            .relationships
            .iter()
            .partition(|r| matches!(r, PlannedRelationship::Construct { .. }));
        for relationship in constructs.into_iter().chain(links) {
            let link = relationship.link();
            let element = link.label();
            let resolved = [&link.source, &link.target].map(|id| created.get(id.as_str()).cloned().ok_or(id));
            let [source, target] = match resolved {
                [Ok(source), Ok(target)] => [source, target],
                [Err(missing), _] | [_, Err(missing)] => {
                    warn!(%element, endpoint = %missing, "relationship dropped");
                    report.errors.push(ImportError::UnknownEndpoint { element, id: missing.clone() });
                    continue;
                }
            };

            let result = match relationship {
                PlannedRelationship::Link(link) => self
                    .create_link(&source, &target, link.link_type, &link.source_multiplicity, &link.target_multiplicity)
                    .await
                    .map(|_| report.links_created += 1),
                PlannedRelationship::Construct { link, class } => {
                    let spec = ConstructSpec {
                        name: class.name.clone(),
                        attributes: class.attributes.clone(),
                        methods: class.methods.clone(),
                        source_multiplicity: link.source_multiplicity.clone(),
                        target_multiplicity: link.target_multiplicity.clone(),
                    };
                    self.create_intermediate_construct_with(&source, &target, spec)
                        .await
                        .map(|construct| {
                            created.insert(class.document_id.as_str(), construct.class.id);
                            report.constructs_created += 1;
                        })
                }
            };
            if let Err(error) = result {
                warn!(%element, error = %error, "relationship not imported");
                report.errors.push(ImportError::Create { element, error });
            }
        }

        info!(
            classes = report.classes_created,
            links = report.links_created,
            constructs = report.constructs_created,
            errors = report.errors.len(),
            "import finished"
        );
        report
    }

    /// Decode an exchange document and import it
    pub async fn import_document(&mut self, xml: &str) -> Result<ImportReport, SyncError> {
        let plan = decode(xml)?;
        Ok(self.import(&plan).await)
    }

    /// Encode what the canvas currently shows
    pub fn export_document(&self) -> Result<String, SyncError> {
        let encoded = encode_with_report(&self.snapshot())?;
        for warning in &encoded.warnings {
            warn!(%warning, "export");
        }
        Ok(encoded.xml)
    }
}
