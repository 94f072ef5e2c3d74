//! Containment-based grouping of a frame's detections.
//!
//! Parent classes (configured in `ParentClassMap`) collect every detection of
//! an eligible sub-class whose box lies inside the parent's box. Other classes
//! are emitted once per frame, first seen wins.
//!
//! Nesting is exactly one level deep. `SubObject` has no `subobject` field, so
//! a sub-object can never carry children of its own:
//!
//! ```compile_fail
//! use subobject_grouper::grouping::SubObject;
//! use subobject_grouper::BoundingBox;
//!
//! let sub = SubObject {
//!     object: "cell phone".to_string(),
//!     bbox: BoundingBox::new(0, 0, 1, 1),
//!     confidence: 0.5,
//!     subobject: Some(Vec::new()),
//! };
//! ```

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::detect::{BoundingBox, Detection};

/// Parent classes and the sub-object labels each may contain.
pub const DEFAULT_PARENT_CLASSES: &[(&str, &[&str])] = &[(
    "person",
    &[
        "cell phone",
        "laptop",
        "backpack",
        "umbrella",
        "handbag",
        "tie",
        "suitcase",
        "book",
        "teddy bear",
        "helmet",
    ],
)];

/// Mapping from parent label to the ordered list of labels eligible as its sub-objects.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParentClassMap {
    parents: BTreeMap<String, Vec<String>>,
}

impl ParentClassMap {
    pub fn new(parents: BTreeMap<String, Vec<String>>) -> Result<Self> {
        let map = Self { parents };
        map.validate()?;
        Ok(map)
    }

    pub fn empty() -> Self {
        Self {
            parents: BTreeMap::new(),
        }
    }

    /// Builder-style insert for a single parent class.
    pub fn with_parent<I, S>(mut self, parent: impl Into<String>, subclasses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parents.insert(
            parent.into(),
            subclasses.into_iter().map(Into::into).collect(),
        );
        self
    }

    pub fn is_parent(&self, label: &str) -> bool {
        self.parents.contains_key(label)
    }

    /// Sub-object labels configured for `parent`, if it is a parent class.
    pub fn subclasses(&self, parent: &str) -> Option<&[String]> {
        self.parents.get(parent).map(Vec::as_slice)
    }

    pub fn accepts(&self, parent: &str, label: &str) -> bool {
        self.subclasses(parent)
            .is_some_and(|subs| subs.iter().any(|s| s == label))
    }

    pub fn parents(&self) -> impl Iterator<Item = &str> {
        self.parents.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    /// Reject blank parent or sub-object labels.
    pub fn validate(&self) -> Result<()> {
        for (parent, subs) in &self.parents {
            if parent.trim().is_empty() {
                return Err(anyhow!("parent class label must not be empty"));
            }
            if subs.iter().any(|s| s.trim().is_empty()) {
                return Err(anyhow!(
                    "sub-object labels for parent '{}' must not be empty",
                    parent
                ));
            }
        }
        Ok(())
    }
}

impl Default for ParentClassMap {
    fn default() -> Self {
        DEFAULT_PARENT_CLASSES
            .iter()
            .fold(Self::empty(), |map, (parent, subs)| {
                map.with_parent(*parent, subs.iter().copied())
            })
    }
}

/// A detection nested under a parent. Never nests further.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubObject {
    pub object: String,
    pub bbox: BoundingBox,
    pub confidence: f64,
}

impl From<&Detection> for SubObject {
    fn from(det: &Detection) -> Self {
        Self {
            object: det.label.clone(),
            bbox: det.bbox,
            confidence: round_confidence(det.confidence),
        }
    }
}

/// A top-level entry in a frame result.
///
/// `subobject` is `Some` (possibly empty) for parent classes and `None` otherwise;
/// `None` is omitted from the serialized form.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupedObject {
    pub object: String,
    pub bbox: BoundingBox,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subobject: Option<Vec<SubObject>>,
}

impl GroupedObject {
    pub fn plain(det: &Detection) -> Self {
        Self {
            object: det.label.clone(),
            bbox: det.bbox,
            confidence: round_confidence(det.confidence),
            subobject: None,
        }
    }

    pub fn parent(det: &Detection, subobjects: Vec<SubObject>) -> Self {
        Self {
            subobject: Some(subobjects),
            ..Self::plain(det)
        }
    }

    pub fn is_parent(&self) -> bool {
        self.subobject.is_some()
    }

    pub fn subobjects(&self) -> &[SubObject] {
        self.subobject.as_deref().unwrap_or(&[])
    }
}

/// Grouped, de-duplicated representation of one frame.
pub type FrameResult = Vec<GroupedObject>;

/// Round a confidence score to two decimal places.
pub fn round_confidence(confidence: f32) -> f64 {
    (f64::from(confidence) * 100.0).round() / 100.0
}

/// Group one frame's detections under their parent classes.
///
/// Pure and deterministic; the output follows detector order. Every parent
/// detection produces an entry whose sub-objects are all contained detections
/// of an eligible class, in scan order and without de-duplication. A parent
/// listing its own class matches itself. Non-parent classes appear once;
/// later detections of an already-emitted label are dropped.
pub fn group_detections(detections: &[Detection], parents: &ParentClassMap) -> FrameResult {
    let mut frame = FrameResult::with_capacity(detections.len());
    let mut seen: HashSet<&str> = HashSet::with_capacity(detections.len());

    for det in detections {
        if let Some(subclasses) = parents.subclasses(&det.label) {
            let subobjects = detections
                .iter()
                .filter(|s| subclasses.contains(&s.label) && det.bbox.contains(&s.bbox))
                .map(SubObject::from)
                .collect();
            seen.insert(det.label.as_str());
            frame.push(GroupedObject::parent(det, subobjects));
        } else if seen.insert(det.label.as_str()) {
            frame.push(GroupedObject::plain(det));
        }
    }

    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(label: &str, bbox: [i32; 4], confidence: f32) -> Detection {
        Detection::new(label, BoundingBox::from(bbox), confidence)
    }

    #[test]
    fn person_with_phone_nests_phone() {
        let frame = group_detections(
            &[
                det("person", [0, 0, 100, 100], 0.90),
                det("cell phone", [10, 10, 20, 20], 0.80),
            ],
            &ParentClassMap::default(),
        );

        assert_eq!(
            frame,
            vec![GroupedObject {
                object: "person".into(),
                bbox: BoundingBox::new(0, 0, 100, 100),
                confidence: 0.9,
                subobject: Some(vec![SubObject {
                    object: "cell phone".into(),
                    bbox: BoundingBox::new(10, 10, 20, 20),
                    confidence: 0.8,
                }]),
            }]
        );
    }

    #[test]
    fn repeated_non_parent_keeps_first() {
        let frame = group_detections(
            &[
                det("car", [0, 0, 10, 10], 0.6),
                det("car", [50, 50, 90, 90], 0.9),
            ],
            &ParentClassMap::default(),
        );
        assert_eq!(frame.len(), 1);
        assert_eq!(frame[0].bbox, BoundingBox::new(0, 0, 10, 10));
        assert!(frame[0].subobject.is_none());
    }

    #[test]
    fn empty_input_yields_empty_frame() {
        assert!(group_detections(&[], &ParentClassMap::default()).is_empty());
    }

    #[test]
    fn parent_without_matches_has_empty_subobject_list() {
        let frame = group_detections(
            &[
                det("person", [0, 0, 50, 50], 0.7),
                det("cell phone", [60, 60, 70, 70], 0.5),
            ],
            &ParentClassMap::default(),
        );
        assert_eq!(frame.len(), 2);
        assert_eq!(frame[0].subobject, Some(Vec::new()));
        assert_eq!(frame[1].object, "cell phone");
        assert!(frame[1].subobject.is_none());
    }

    #[test]
    fn contained_sub_object_also_appears_top_level() {
        let frame = group_detections(
            &[
                det("cell phone", [10, 10, 20, 20], 0.8),
                det("person", [0, 0, 100, 100], 0.9),
            ],
            &ParentClassMap::default(),
        );
        let labels: Vec<&str> = frame.iter().map(|g| g.object.as_str()).collect();
        assert_eq!(labels, vec!["cell phone", "person"]);
        assert_eq!(frame[1].subobjects().len(), 1);
    }

    #[test]
    fn every_parent_instance_is_emitted() {
        let frame = group_detections(
            &[
                det("person", [0, 0, 100, 100], 0.9),
                det("person", [200, 0, 300, 100], 0.8),
                det("laptop", [210, 10, 260, 60], 0.7),
            ],
            &ParentClassMap::default(),
        );
        assert_eq!(frame.len(), 3);
        assert!(frame[0].subobjects().is_empty());
        assert_eq!(frame[1].subobjects()[0].object, "laptop");
        assert_eq!(frame[2].object, "laptop");
    }

    #[test]
    fn self_listed_parent_contains_itself() {
        let parents = ParentClassMap::empty().with_parent("person", ["person"]);
        let frame = group_detections(&[det("person", [0, 0, 10, 10], 0.5)], &parents);
        assert_eq!(frame.len(), 1);
        assert_eq!(frame[0].subobjects().len(), 1);
        assert_eq!(frame[0].subobjects()[0].bbox, frame[0].bbox);
    }

    #[test]
    fn duplicate_sub_objects_are_not_deduplicated() {
        let frame = group_detections(
            &[
                det("person", [0, 0, 100, 100], 0.9),
                det("book", [5, 5, 15, 15], 0.4),
                det("book", [5, 5, 15, 15], 0.4),
            ],
            &ParentClassMap::default(),
        );
        assert_eq!(frame[0].subobjects().len(), 2);
        // second book is dropped at top level
        assert_eq!(frame.len(), 2);
    }

    #[test]
    fn confidence_rounds_to_two_places() {
        assert_eq!(round_confidence(0.876), 0.88);
        assert_eq!(round_confidence(0.5), 0.5);
        assert_eq!(round_confidence(0.0), 0.0);
        assert_eq!(round_confidence(1.0), 1.0);
    }

    #[test]
    fn serialized_keys_follow_field_order() {
        let frame = group_detections(
            &[
                det("person", [0, 0, 100, 100], 0.9),
                det("tie", [40, 40, 50, 80], 0.61),
                det("dog", [0, 0, 1, 1], 0.3),
            ],
            &ParentClassMap::default(),
        );
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(
            json,
            concat!(
                r#"[{"object":"person","bbox":[0,0,100,100],"confidence":0.9,"#,
                r#""subobject":[{"object":"tie","bbox":[40,40,50,80],"confidence":0.61}]},"#,
                r#"{"object":"tie","bbox":[40,40,50,80],"confidence":0.61},"#,
                r#"{"object":"dog","bbox":[0,0,1,1],"confidence":0.3}]"#
            )
        );
    }

    #[test]
    fn default_map_has_person_parent() {
        let map = ParentClassMap::default();
        assert!(map.is_parent("person"));
        assert!(map.accepts("person", "cell phone"));
        assert!(map.accepts("person", "helmet"));
        assert!(!map.accepts("person", "car"));
        assert!(!map.is_parent("car"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn map_validation_rejects_blank_labels() {
        let mut parents = BTreeMap::new();
        parents.insert("person".to_string(), vec![" ".to_string()]);
        assert!(ParentClassMap::new(parents).is_err());
    }
}
