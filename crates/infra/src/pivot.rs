//! Object-centric grants pivoted into subject-centric ACM frames.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use warden_auth::{AccessControl, AccessKind};
use warden_core::{ObjectId, SubjectId, set_ops};

/// Body of an object-centric grant: "these subjects may do these things to
/// this one object", plus the class the object belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectGrant {
    pub object: ObjectId,
    pub schema_name: String,
    pub service_name: String,
    #[serde(default)]
    pub access_control: AccessControl<SubjectId>,
}

impl ObjectGrant {
    /// The subject lists reinterpreted as role names, used as the class
    /// template when the schema is first created.
    pub fn role_template(&self) -> AccessControl<String> {
        let names = |kind: AccessKind| -> Vec<String> {
            self.access_control
                .get(kind)
                .iter()
                .map(|s| s.as_str().to_string())
                .collect()
        };
        AccessControl {
            read: names(AccessKind::Read),
            update: names(AccessKind::Update),
            delete: names(AccessKind::Delete),
        }
    }
}

/// One frame per distinct subject, holding `object` under every action the
/// subject was listed for and nothing else.
pub fn pivot(
    object: &ObjectId,
    access_control: &AccessControl<SubjectId>,
) -> BTreeMap<SubjectId, AccessControl<ObjectId>> {
    let mut frames: BTreeMap<SubjectId, AccessControl<ObjectId>> = BTreeMap::new();
    for (kind, subjects) in access_control.iter() {
        for subject in subjects {
            let frame = frames.entry(subject.clone()).or_default();
            set_ops::push_unique(frame.get_mut(kind), std::slice::from_ref(object));
        }
    }
    frames
}

/// Union `other` into `frames`, per subject and per kind.
pub fn merge_frames(
    frames: &mut BTreeMap<SubjectId, AccessControl<ObjectId>>,
    other: BTreeMap<SubjectId, AccessControl<ObjectId>>,
) {
    for (subject, frame) in other {
        let target = frames.entry(subject).or_default();
        for (kind, ids) in frame.iter() {
            set_ops::push_unique(target.get_mut(kind), ids);
        }
    }
}
