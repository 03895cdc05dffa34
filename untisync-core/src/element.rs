//! Roster elements and their resolution.
//!
//! A timetable period references its participants (class groups, teachers,
//! the subject, rooms) by numeric id only. The weekly timetable response
//! ships a roster of named elements alongside the periods; resolution links
//! the two. A reference that additionally carries an `orgId` different from
//! its `id` denotes a substitution, and the pre-substitution element is
//! resolved the same way and attached as `original`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The kind of a roster element, as numbered by the WebUntis API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Group,
    Teacher,
    Subject,
    Room,
}

impl ElementKind {
    /// Map a wire `type` number to a kind. Unknown numbers (e.g. the
    /// student element type 5) yield `None` and are skipped by callers.
    pub fn from_wire(value: u8) -> Option<ElementKind> {
        match value {
            1 => Some(ElementKind::Group),
            2 => Some(ElementKind::Teacher),
            3 => Some(ElementKind::Subject),
            4 => Some(ElementKind::Room),
            _ => None,
        }
    }
}

/// Whether an element takes part in the lesson as planned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ElementState {
    Regular,
    Substituted,
    Absent,
}

/// A named roster entry from the weekly timetable response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawElement {
    #[serde(rename = "type")]
    pub kind: u8,
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub long_name: Option<String>,
    #[serde(default)]
    pub room_capacity: Option<u32>,
}

/// An unresolved element reference inside a period.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementRef {
    #[serde(rename = "type")]
    pub kind: u8,
    pub id: i64,
    #[serde(default)]
    pub org_id: i64,
    pub state: ElementState,
}

/// A resolved element without substitution state (also used for the
/// pre-substitution `original`).
///
/// `name` is `None` when the roster had no entry for the id; resolution
/// degrades instead of failing. Teachers never carry a long name, only
/// rooms carry a capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: i64,
    pub name: Option<String>,
    pub long_name: Option<String>,
    pub capacity: Option<u32>,
}

/// A resolved element annotated with its substitution state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatefulElement {
    pub id: i64,
    pub name: Option<String>,
    pub long_name: Option<String>,
    pub capacity: Option<u32>,
    pub state: ElementState,
    pub original: Option<Element>,
}

impl StatefulElement {
    /// True when the source signaled a genuine substitution for this slot.
    pub fn is_substituted(&self) -> bool {
        self.original.is_some()
    }
}

/// Read-only roster lookup keyed by (kind, id), built once per fetch.
pub struct ElementIndex {
    entries: HashMap<(ElementKind, i64), Element>,
}

impl ElementIndex {
    pub fn new(roster: &[RawElement]) -> ElementIndex {
        let entries = roster
            .iter()
            .filter_map(|raw| {
                let kind = ElementKind::from_wire(raw.kind)?;
                let element = Element {
                    id: raw.id,
                    name: Some(raw.name.clone()),
                    long_name: match kind {
                        ElementKind::Teacher => None,
                        _ => raw.long_name.clone(),
                    },
                    capacity: match kind {
                        ElementKind::Room => raw.room_capacity,
                        _ => None,
                    },
                };
                Some(((kind, raw.id), element))
            })
            .collect();

        ElementIndex { entries }
    }

    /// Resolve an id to a named element, degrading to an id-only element
    /// when the roster has no match.
    pub fn resolve(&self, kind: ElementKind, id: i64) -> Element {
        match self.entries.get(&(kind, id)) {
            Some(element) => element.clone(),
            None => Element {
                id,
                name: None,
                long_name: None,
                capacity: None,
            },
        }
    }

    /// Resolve a period element reference to a stateful element.
    ///
    /// Returns the kind alongside so callers can partition the results.
    /// References with an unknown kind number resolve to `None`.
    pub fn resolve_stateful(&self, reference: &ElementRef) -> Option<(ElementKind, StatefulElement)> {
        let kind = ElementKind::from_wire(reference.kind)?;
        let base = self.resolve(kind, reference.id);

        if base.name.is_none() {
            eprintln!(
                "warning: element {} (type {}) not found in roster",
                reference.id, reference.kind
            );
        }

        // `original` only for a genuine substitution: a non-zero backing id
        // different from the element's own id.
        let original = (reference.org_id != 0 && reference.org_id != reference.id)
            .then(|| self.resolve(kind, reference.org_id));

        Some((
            kind,
            StatefulElement {
                id: base.id,
                name: base.name,
                long_name: base.long_name,
                capacity: base.capacity,
                state: reference.state,
                original,
            },
        ))
    }
}
