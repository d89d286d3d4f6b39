//! Catalog input: object classification and batch ingestion of element sets.
//!
//! A bad element set is reported for its object and never aborts the rest of
//! the batch. Retrying a bad set is up to whoever feeds the catalog.

use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use log::{debug, info, warn};

use crate::elements::{parse, OrbitalElementSet};
use crate::error::{malformed, EngineError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    Payload,
    RocketBody,
    Debris,
    Unknown,
}

impl ObjectKind {
    /// A declared catalog object type wins over the name heuristic.
    pub fn classify(name: Option<&str>, declared: Option<&str>) -> ObjectKind {
        if let Some(declared) = declared {
            match declared.trim().to_ascii_uppercase().as_str() {
                "PAYLOAD" => return ObjectKind::Payload,
                "ROCKET BODY" | "ROCKET_BODY" => return ObjectKind::RocketBody,
                "DEBRIS" => return ObjectKind::Debris,
                "UNKNOWN" | "TBA" => return ObjectKind::Unknown,
                _ => {}
            }
        }

        match name.map(str::trim) {
            Some(n) if n.is_empty() => ObjectKind::Unknown,
            Some(n) if n.contains("DEB") => ObjectKind::Debris,
            Some(n) if n.contains("R/B") => ObjectKind::RocketBody,
            Some(_) => ObjectKind::Payload,
            None => ObjectKind::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Constellation {
    Starlink,
    OneWeb,
    Iridium,
    Other,
}

impl Constellation {
    pub fn classify(name: &str) -> Constellation {
        let n = name.trim_start().to_ascii_uppercase();
        if n.starts_with("STARLINK") {
            Constellation::Starlink
        } else if n.starts_with("ONEWEB") {
            Constellation::OneWeb
        } else if n.starts_with("IRIDIUM") {
            Constellation::Iridium
        } else {
            Constellation::Other
        }
    }
}

/// An element set together with what the catalog knows about the object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub set: OrbitalElementSet,
    pub name: Option<String>,
    pub kind: ObjectKind,
}

impl CatalogEntry {
    pub fn new(set: OrbitalElementSet, name: Option<String>) -> Self {
        let kind = ObjectKind::classify(name.as_deref(), None);
        CatalogEntry { set, name, kind }
    }

    pub fn with_kind(mut self, kind: ObjectKind) -> Self {
        self.kind = kind;
        self
    }

    /// Reclassify from the object type a catalog feed declares (e.g. "ROCKET BODY").
    /// An unrecognised declaration falls back to the name heuristic.
    pub fn with_declared_type(self, declared: &str) -> Self {
        let kind = ObjectKind::classify(self.name.as_deref(), Some(declared));
        self.with_kind(kind)
    }

    pub fn catalog_number(&self) -> u32 {
        self.set.catalog_number
    }

    pub fn constellation(&self) -> Constellation {
        self.name.as_deref().map(Constellation::classify).unwrap_or(Constellation::Other)
    }
}

impl From<OrbitalElementSet> for CatalogEntry {
    fn from(set: OrbitalElementSet) -> Self {
        CatalogEntry::new(set, None)
    }
}

#[derive(Debug)]
pub struct IngestFailure {
    pub catalog_number: Option<u32>,
    pub error: EngineError,
}

#[derive(Debug, Default)]
pub struct IngestReport {
    pub entries: Vec<CatalogEntry>,
    pub failures: Vec<IngestFailure>,
}

/// Parse `(catalog number, line 1, line 2)` triples from a catalog feed.
pub fn ingest<'a, I>(triples: I) -> IngestReport
where
    I: IntoIterator<Item = (u32, &'a str, &'a str)>,
{
    let mut report = IngestReport::default();

    for (catalog_number, line1, line2) in triples {
        match parse(line1, line2) {
            Ok(set) if set.catalog_number == catalog_number => {
                report.entries.push(CatalogEntry::from(set));
            }
            Ok(set) => {
                warn!("[ingest] object {catalog_number}: lines carry catalog number {}", set.catalog_number);
                report.failures.push(IngestFailure {
                    catalog_number: Some(catalog_number),
                    error: malformed!("declared catalog number {catalog_number} does not match lines ({})", set.catalog_number),
                });
            }
            Err(e) => {
                warn!("[ingest] object {catalog_number}: {e}");
                report.failures.push(IngestFailure { catalog_number: Some(catalog_number), error: e });
            }
        }
    }

    info!("[ingest] {} element sets accepted, {} rejected", report.entries.len(), report.failures.len());
    report
}

/// Parse a two- or three-line text feed (the name line is optional). When the
/// same object appears more than once the newest epoch is kept.
pub fn parse_catalog_text(text: &str) -> IngestReport {
    let lines: Vec<&str> = text.lines().map(|l| l.trim_end()).filter(|l| !l.is_empty()).collect();

    let mut report = IngestReport::default();
    let mut newest: BTreeMap<u32, CatalogEntry> = BTreeMap::new();
    let mut pending_name: Option<&str> = None;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        if line.starts_with("1 ") && i + 1 < lines.len() && lines[i + 1].starts_with("2 ") {
            let name = pending_name.take().map(|n| n.trim().trim_start_matches("0 ").to_string());
            match parse(line, lines[i + 1]) {
                Ok(set) => {
                    let entry = CatalogEntry::new(set, name);
                    let replace = newest.get(&entry.catalog_number()).map_or(true, |old| entry.set.supersedes(&old.set));
                    if replace {
                        newest.insert(entry.catalog_number(), entry);
                    } else {
                        debug!("[catalog] ignoring older set for {}", entry.catalog_number());
                    }
                }
                Err(e) => {
                    let catalog_number = line.get(2..7).and_then(|s| s.trim().parse().ok());
                    warn!("[catalog] {}: {e}", name.as_deref().unwrap_or("unnamed object"));
                    report.failures.push(IngestFailure { catalog_number, error: e });
                }
            }
            i += 2;
        } else {
            if let Some(orphan) = pending_name.replace(line) {
                debug!("[catalog] skipping unpaired line '{orphan}'");
            }
            i += 1;
        }
    }

    report.entries = newest.into_values().collect();
    info!("[catalog] parsed {} objects, {} rejected", report.entries.len(), report.failures.len());
    report
}
