//! The Resource Model (component D, spec.md §4.D): local, read-only
//! mirrors of server-defined resource definitions, application
//! classes, and zone names, populated exactly once from the initial
//! query handshake (§4.E "Open Question resolutions").

use fxhash::FxHashMap;

use crate::error::{Error, Result};

/// One of the four wire-level attribute value shapes (spec.md §6:
/// "Value type is one of string, s32, u32, double").
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    String(String),
    Int(i32),
    UInt(u32),
    Float(f64),
}

/// `AttrDef.type` (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrType {
    String,
    Int,
    UInt,
    Float,
}

bitflags::bitflags! {
    /// `AttrDef.access` (spec.md §3): read/write permission bits,
    /// checked against attribute writes with case-insensitive name
    /// matching (§4.D).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Access: u8 {
        const READ = 0b01;
        const WRITE = 0b10;
    }
}

/// `{ name, type, default, access }` (spec.md §3).
#[derive(Debug, Clone, PartialEq)]
pub struct AttrDef {
    pub name: String,
    pub ty: AttrType,
    pub default: AttrValue,
    pub access: Access,
}

/// A concrete attribute value carried on the wire, as distinct from
/// an `AttrDef`'s schema entry (spec.md §3 "Attribute": "a tagged
/// (type, value) pair carrying a name").
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub value: AttrValue,
}

/// A named, described attribute as returned by `read_all_attributes`.
#[derive(Debug, Clone, PartialEq)]
pub struct AttrDescriptor {
    pub name: String,
    pub ty: AttrType,
    pub value: AttrValue,
    pub access: Access,
}

/// `{ id, name, shareable, attribute_defs }` (spec.md §3).
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDef {
    pub id: u32,
    pub name: String,
    pub shareable: bool,
    pub attribute_defs: Vec<AttrDef>,
}

impl ResourceDef {
    /// Looks up an attribute definition by name, matching
    /// case-insensitively per spec.md §4.D.
    pub fn attr_def(&self, name: &str) -> Option<&AttrDef> {
        self.attribute_defs
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
    }
}

/// Just a name; priority is arbitrated server-side (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationClass {
    pub name: String,
}

/// Local mirror of the server's resource/class/zone schema
/// (spec.md §4.D). Read-only once populated.
#[derive(Debug, Default)]
pub struct ResourceModel {
    classes: Vec<ApplicationClass>,
    zones: Vec<String>,
    resources: Vec<ResourceDef>,
    resource_by_name: FxHashMap<String, usize>,
    initialized: bool,
}

impl ResourceModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn class_names(&self) -> Vec<&str> {
        self.classes.iter().map(|c| c.name.as_str()).collect()
    }

    /// The proxy exports exactly its own configured zone (spec.md
    /// §4.D), so this always has at most one entry.
    pub fn zone_names(&self) -> Vec<&str> {
        self.zones.iter().map(String::as_str).collect()
    }

    pub fn resource_names(&self) -> Vec<&str> {
        self.resources.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn resource_by_name(&self, name: &str) -> Option<&ResourceDef> {
        self.resource_by_name
            .get(name)
            .map(|&idx| &self.resources[idx])
    }

    pub fn resource_by_id(&self, id: u32) -> Option<&ResourceDef> {
        self.resources.iter().find(|r| r.id == id)
    }

    pub fn read_all_attributes(&self, resource_id: u32) -> Result<Vec<AttrDescriptor>> {
        let def = self
            .resource_by_id(resource_id)
            .ok_or_else(|| Error::NotFound(format!("resource id {resource_id}")))?;
        Ok(def
            .attribute_defs
            .iter()
            .map(|a| AttrDescriptor {
                name: a.name.clone(),
                ty: a.ty,
                value: a.default.clone(),
                access: a.access,
            })
            .collect())
    }

    /// Validates a proposed attribute write against `AttrDef.access`
    /// (WRITE bit required), matching by case-insensitive name
    /// (spec.md §4.D).
    pub fn check_writable(&self, resource_id: u32, attr_name: &str) -> Result<()> {
        let def = self
            .resource_by_id(resource_id)
            .ok_or_else(|| Error::NotFound(format!("resource id {resource_id}")))?;
        let attr = def
            .attr_def(attr_name)
            .ok_or_else(|| Error::NotFound(format!("attribute {attr_name}")))?;
        if !attr.access.contains(Access::WRITE) {
            return Err(Error::InvalidArg(format!(
                "attribute {attr_name} is not writable"
            )));
        }
        Ok(())
    }

    /// Resolves the full, current attribute set of `resource_name`
    /// given a set of values reported by the server: every attribute
    /// starts at its schema default and is overridden by `incoming`
    /// only when `AttrDef.access` grants `WRITE` and the name matches
    /// case-insensitively (spec.md §4.D, §4.E "apply attrs"; grounded
    /// on `mrp_attribute_set_values` in the original implementation,
    /// which walks every attribute definition and only lets a
    /// write-access one accept the caller's value). Incoming names
    /// with no matching definition are dropped rather than rejected —
    /// there is no definition to validate them against.
    pub fn resolve_attrs(&self, resource_name: &str, incoming: &[Attribute]) -> Result<Vec<Attribute>> {
        let def = self
            .resource_by_name(resource_name)
            .ok_or_else(|| Error::NotFound(format!("resource {resource_name}")))?;
        let mut resolved: Vec<Attribute> = self
            .read_all_attributes(def.id)?
            .into_iter()
            .map(|d| Attribute { name: d.name, value: d.value })
            .collect();

        for attr in incoming {
            let Some(slot) = resolved
                .iter_mut()
                .find(|r| r.name.eq_ignore_ascii_case(&attr.name))
            else {
                tracing::warn!(
                    resource = resource_name,
                    attr = attr.name.as_str(),
                    "event attribute not in resource schema, ignoring"
                );
                continue;
            };
            if let Err(err) = self.check_writable(def.id, &attr.name) {
                tracing::debug!(
                    resource = resource_name,
                    attr = attr.name.as_str(),
                    %err,
                    "ignoring non-writable event attribute"
                );
                continue;
            }
            slot.value = attr.value.clone();
        }

        Ok(resolved)
    }

    /// Populates the model from the handshake's two query replies.
    /// Read-only once initialized — a second call is rejected rather
    /// than silently merged, guarding the "populated exactly once"
    /// invariant (SPEC_FULL.md §4.D).
    pub fn apply_query_reply(
        &mut self,
        classes: Vec<ApplicationClass>,
        zones: Vec<String>,
        resources: Vec<ResourceDef>,
    ) -> Result<()> {
        if self.initialized {
            return Err(Error::AlreadyExists("resource model already initialized".into()));
        }
        self.resource_by_name = resources
            .iter()
            .enumerate()
            .map(|(idx, r)| (r.name.clone(), idx))
            .collect();
        self.classes = classes;
        self.zones = zones;
        self.resources = resources;
        self.initialized = true;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_def() -> ResourceDef {
        ResourceDef {
            id: 1,
            name: "speaker".into(),
            shareable: true,
            attribute_defs: vec![AttrDef {
                name: "Volume".into(),
                ty: AttrType::Int,
                default: AttrValue::Int(50),
                access: Access::READ | Access::WRITE,
            }],
        }
    }

    #[test]
    fn test_apply_query_reply_once() {
        let mut model = ResourceModel::new();
        model
            .apply_query_reply(
                vec![ApplicationClass { name: "player".into() }],
                vec!["home".into()],
                vec![sample_def()],
            )
            .unwrap();
        assert!(model.is_initialized());
        assert_eq!(model.class_names(), vec!["player"]);
        assert_eq!(model.zone_names(), vec!["home"]);
        assert!(model.resource_by_name("speaker").is_some());

        let err = model
            .apply_query_reply(vec![], vec![], vec![])
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
    }

    #[test]
    fn test_read_all_attributes_case_insensitive_write_check() {
        let mut model = ResourceModel::new();
        model
            .apply_query_reply(vec![], vec!["home".into()], vec![sample_def()])
            .unwrap();
        let attrs = model.read_all_attributes(1).unwrap();
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs[0].name, "Volume");

        model.check_writable(1, "volume").unwrap();
        let err = model.check_writable(1, "missing").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_resolve_attrs_overrides_defaults_case_insensitively() {
        let mut model = ResourceModel::new();
        model
            .apply_query_reply(vec![], vec!["home".into()], vec![sample_def()])
            .unwrap();

        let resolved = model
            .resolve_attrs(
                "speaker",
                &[Attribute {
                    name: "VOLUME".into(),
                    value: AttrValue::Int(77),
                }],
            )
            .unwrap();
        assert_eq!(
            resolved,
            vec![Attribute {
                name: "Volume".into(),
                value: AttrValue::Int(77),
            }]
        );
    }

    #[test]
    fn test_resolve_attrs_ignores_read_only_and_unknown_names() {
        let mut def = sample_def();
        def.attribute_defs[0].access = Access::READ;
        let mut model = ResourceModel::new();
        model.apply_query_reply(vec![], vec![], vec![def]).unwrap();

        let resolved = model
            .resolve_attrs(
                "speaker",
                &[
                    Attribute {
                        name: "volume".into(),
                        value: AttrValue::Int(99),
                    },
                    Attribute {
                        name: "brightness".into(),
                        value: AttrValue::Int(1),
                    },
                ],
            )
            .unwrap();
        assert_eq!(
            resolved,
            vec![Attribute {
                name: "Volume".into(),
                value: AttrValue::Int(50),
            }]
        );
    }

    #[test]
    fn test_check_writable_rejects_read_only() {
        let mut def = sample_def();
        def.attribute_defs[0].access = Access::READ;
        let mut model = ResourceModel::new();
        model.apply_query_reply(vec![], vec![], vec![def]).unwrap();
        let err = model.check_writable(1, "Volume").unwrap_err();
        assert!(matches!(err, Error::InvalidArg(_)));
    }
}
