//! Message construction and parsing for the six wire shapes of
//! spec.md §6, built on the semantics-agnostic primitives in
//! `wire-codec`. `RequestType` lives here rather than in `wire-codec`
//! itself, since the codec must stay agnostic to any one protocol's
//! schema (spec.md §4.C, SPEC_FULL.md §4.C).

use wire_codec::{Cursor, Field, FieldValue, MessageBuilder, Tag};

use crate::error::{Error, Result};
use crate::model::{Attribute, AttrValue, ApplicationClass, ResourceDef};
use crate::proxy::{OutboundRequest, ResourceRequest, RsetFlags, SetState};

/// `REQUEST_TYPE` (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum RequestType {
    QueryClasses = 1,
    QueryResources = 2,
    CreateResourceSet = 3,
    DestroyResourceSet = 4,
    AcquireResourceSet = 5,
    ReleaseResourceSet = 6,
    ResourcesEvent = 7,
}

impl RequestType {
    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn from_code(code: u16) -> Option<RequestType> {
        Some(match code {
            1 => RequestType::QueryClasses,
            2 => RequestType::QueryResources,
            3 => RequestType::CreateResourceSet,
            4 => RequestType::DestroyResourceSet,
            5 => RequestType::AcquireResourceSet,
            6 => RequestType::ReleaseResourceSet,
            7 => RequestType::ResourcesEvent,
            _ => return None,
        })
    }
}

/// Encodes the given [`OutboundRequest`] into the corresponding
/// wire-level query-handshake-independent request shape.
pub fn encode_request(req: &OutboundRequest) -> bytes::Bytes {
    match req {
        OutboundRequest::Create {
            seqno,
            rset_flags,
            class,
            zone,
            priority,
            resources,
        } => encode_create(*seqno, *rset_flags, class, zone, *priority, resources),
        OutboundRequest::Acquire { seqno, server_id } => {
            encode_state_request(*seqno, RequestType::AcquireResourceSet, *server_id)
        }
        OutboundRequest::Release { seqno, server_id } => {
            encode_state_request(*seqno, RequestType::ReleaseResourceSet, *server_id)
        }
        OutboundRequest::Destroy { seqno, server_id } => {
            encode_state_request(*seqno, RequestType::DestroyResourceSet, *server_id)
        }
    }
}

fn encode_attr_value(builder: MessageBuilder, value: &AttrValue) -> MessageBuilder {
    match value {
        AttrValue::String(s) => builder.string(Tag::AttributeValue, s.clone()),
        AttrValue::Int(v) => builder.s32(Tag::AttributeValue, *v),
        AttrValue::UInt(v) => builder.u32(Tag::AttributeValue, *v),
        AttrValue::Float(v) => builder.double(Tag::AttributeValue, *v),
    }
}

fn encode_create(
    seqno: u32,
    rset_flags: RsetFlags,
    class: &str,
    zone: &str,
    priority: u32,
    resources: &[ResourceRequest],
) -> bytes::Bytes {
    let mut builder = MessageBuilder::new()
        .u32(Tag::SequenceNo, seqno)
        .u16(Tag::RequestType, RequestType::CreateResourceSet.code())
        .u32(Tag::ResourceFlags, rset_flags.bits())
        .u32(Tag::ResourcePriority, priority)
        .string(Tag::ClassName, class)
        .string(Tag::ZoneName, zone);

    for resource in resources {
        builder = builder
            .string(Tag::ResourceName, resource.resource_name.clone())
            .u32(Tag::ResourceFlags, resource.flags.bits());
        for attr in &resource.attrs {
            builder = builder.string(Tag::AttributeName, attr.name.clone());
            builder = encode_attr_value(builder, &attr.value);
        }
        builder = builder.section_end();
    }

    builder.end()
}

fn encode_state_request(seqno: u32, request_type: RequestType, server_id: u32) -> bytes::Bytes {
    MessageBuilder::new()
        .u32(Tag::SequenceNo, seqno)
        .u16(Tag::RequestType, request_type.code())
        .u32(Tag::ResourceSetId, server_id)
        .end()
}

pub fn encode_query_classes(seqno: u32) -> bytes::Bytes {
    MessageBuilder::new()
        .u32(Tag::SequenceNo, seqno)
        .u16(Tag::RequestType, RequestType::QueryClasses.code())
        .end()
}

pub fn encode_query_resources(seqno: u32) -> bytes::Bytes {
    MessageBuilder::new()
        .u32(Tag::SequenceNo, seqno)
        .u16(Tag::RequestType, RequestType::QueryResources.code())
        .end()
}

/// Decoded `CREATE_RESOURCE_SET` reply (spec.md §6).
#[derive(Debug, Clone, PartialEq)]
pub struct CreateReply {
    pub seqno: u32,
    pub ok: bool,
    pub error_code: i16,
    pub resource_set_id: u32,
}

/// Decoded `RESOURCES_EVENT` (spec.md §6), including the per-resource
/// repeated group.
#[derive(Debug, Clone, PartialEq)]
pub struct EventResource {
    pub resource_id: u32,
    pub name: String,
    pub attrs: Vec<Attribute>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub seqno: u32,
    pub resource_set_id: u32,
    pub state: SetState,
    pub grant_mask: u32,
    pub advice_mask: u32,
    pub resources: Vec<EventResource>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryClassesReply {
    pub seqno: u32,
    pub ok: bool,
    pub error_code: i16,
    pub classes: Vec<ApplicationClass>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryResourcesReply {
    pub seqno: u32,
    pub resources: Vec<ResourceDef>,
}

/// Peeks the first two fields of a message (always `SEQUENCE_NO` then
/// `REQUEST_TYPE` per every shape in spec.md §6) to decide which
/// decoder to dispatch to, without consuming the cursor passed to it.
pub fn peek_request_type(bytes: &bytes::Bytes) -> Result<RequestType> {
    let mut cursor = Cursor::new(bytes.clone());
    let _seqno = cursor.fetch_u32(Tag::SequenceNo)?;
    let code = cursor.fetch_u16(Tag::RequestType)?;
    RequestType::from_code(code).ok_or_else(|| Error::Protocol(format!("unknown request type {code}")))
}

pub fn decode_create_reply(bytes: bytes::Bytes) -> Result<CreateReply> {
    let mut cursor = Cursor::new(bytes);
    let seqno = cursor.fetch_u32(Tag::SequenceNo)?;
    let _ty = cursor.fetch_u16(Tag::RequestType)?;
    let status = cursor.fetch_s16(Tag::RequestStatus)?;
    let resource_set_id = cursor.fetch_u32(Tag::ResourceSetId)?;
    Ok(CreateReply {
        seqno,
        ok: status == 0,
        error_code: status,
        resource_set_id,
    })
}

fn decode_attr_value(field: Field) -> Result<AttrValue> {
    Ok(match field.value {
        FieldValue::String(s) => AttrValue::String(s),
        FieldValue::S32(v) => AttrValue::Int(v),
        FieldValue::U32(v) => AttrValue::UInt(v),
        FieldValue::Double(v) => AttrValue::Float(v),
        other => {
            return Err(Error::Protocol(format!(
                "unexpected attribute value payload {other:?}"
            )))
        }
    })
}

pub fn decode_event(bytes: bytes::Bytes) -> Result<Event> {
    let mut cursor = Cursor::new(bytes);
    let seqno = cursor.fetch_u32(Tag::SequenceNo)?;
    let _ty = cursor.fetch_u16(Tag::RequestType)?;
    let resource_set_id = cursor.fetch_u32(Tag::ResourceSetId)?;
    let state_code = cursor.fetch_u16(Tag::ResourceState)?;
    let state = match state_code {
        0 => SetState::NoRequest,
        1 => SetState::Acquire,
        2 => SetState::Release,
        other => return Err(Error::Protocol(format!("unknown RESOURCE_STATE {other}"))),
    };
    let grant_mask = cursor.fetch_u32(Tag::ResourceGrant)?;
    let advice_mask = cursor.fetch_u32(Tag::ResourceAdvice)?;

    let mut resources = Vec::new();
    let mut next_field = match cursor.next() {
        Some(f) => Some(f?),
        None => None,
    };

    while let Some(field) = next_field {
        if field.tag == Tag::MessageEnd {
            break;
        }
        if field.tag != Tag::ResourceId {
            return Err(Error::Protocol(format!(
                "expected RESOURCE_ID starting an event resource section, found {:?}",
                field.tag
            )));
        }
        let resource_id = match field.value {
            FieldValue::U32(v) => v,
            other => return Err(Error::Protocol(format!("RESOURCE_ID carried {other:?}"))),
        };
        let name_field = cursor
            .next()
            .ok_or_else(|| Error::Protocol("missing RESOURCE_NAME in event section".into()))??;
        if name_field.tag != Tag::ResourceName {
            return Err(Error::Protocol("RESOURCE_ID not followed by RESOURCE_NAME".into()));
        }
        let name = match name_field.value {
            FieldValue::String(s) => s,
            other => return Err(Error::Protocol(format!("RESOURCE_NAME carried {other:?}"))),
        };

        // An event's per-resource attribute list has no section
        // terminator of its own; the next RESOURCE_ID or MESSAGE_END
        // marks its end.
        let (attrs, boundary) = decode_attrs_until_boundary(&mut cursor)?;
        resources.push(EventResource {
            resource_id,
            name,
            attrs,
        });

        next_field = if boundary.tag == Tag::MessageEnd {
            None
        } else {
            Some(boundary)
        };
    }

    Ok(Event {
        seqno,
        resource_set_id,
        state,
        grant_mask,
        advice_mask,
        resources,
    })
}

/// Reads attribute `{name,value}` pairs until a `RESOURCE_ID` or
/// `MESSAGE_END` boundary field is reached, returning that boundary
/// field unconsumed-in-spirit (its content, for the caller to act on).
fn decode_attrs_until_boundary(cursor: &mut Cursor) -> Result<(Vec<Attribute>, Field)> {
    let mut attrs = Vec::new();
    loop {
        let field = cursor
            .next()
            .ok_or_else(|| Error::Protocol("message ended mid-attribute-list".into()))??;
        if field.tag == Tag::ResourceId || field.tag == Tag::MessageEnd {
            return Ok((attrs, field));
        }
        if field.tag != Tag::AttributeName {
            return Err(Error::Protocol(format!(
                "expected ATTRIBUTE_NAME, RESOURCE_ID or MESSAGE_END, found {:?}",
                field.tag
            )));
        }
        let name = match field.value {
            FieldValue::String(s) => s,
            other => return Err(Error::Protocol(format!("ATTRIBUTE_NAME carried {other:?}"))),
        };
        let value_field = cursor
            .next()
            .ok_or_else(|| Error::Protocol("missing ATTRIBUTE_VALUE".into()))??;
        if value_field.tag != Tag::AttributeValue {
            return Err(Error::Protocol("ATTRIBUTE_NAME not followed by ATTRIBUTE_VALUE".into()));
        }
        attrs.push(Attribute {
            name,
            value: decode_attr_value(value_field)?,
        });
    }
}

pub fn decode_query_classes_reply(bytes: bytes::Bytes) -> Result<QueryClassesReply> {
    let mut cursor = Cursor::new(bytes);
    let seqno = cursor.fetch_u32(Tag::SequenceNo)?;
    let _ty = cursor.fetch_u16(Tag::RequestType)?;
    let status = cursor.fetch_s16(Tag::RequestStatus)?;
    let classes = cursor
        .fetch_array_of_string(Tag::ClassName)?
        .into_iter()
        .map(|name| ApplicationClass { name })
        .collect();
    Ok(QueryClassesReply {
        seqno,
        ok: status == 0,
        error_code: status,
        classes,
    })
}

/// Resource ids are assigned locally in the order resources appear in
/// the reply (the wire shape carries no `RESOURCE_ID` of its own here
/// — see `DESIGN.md` for this Open Question resolution). Access
/// defaults to read-write and shareable defaults to true, since
/// neither bit is present on this reply shape either.
pub fn decode_query_resources_reply(bytes: bytes::Bytes) -> Result<QueryResourcesReply> {
    use crate::model::{Access, AttrDef, AttrType};

    let mut cursor = Cursor::new(bytes);
    let seqno = cursor.fetch_u32(Tag::SequenceNo)?;
    let _ty = cursor.fetch_u16(Tag::RequestType)?;

    let mut resources = Vec::new();
    let mut next_id = 1u32;
    loop {
        let field = match cursor.next() {
            Some(f) => f?,
            None => break,
        };
        if field.tag == Tag::MessageEnd {
            break;
        }
        if field.tag != Tag::ResourceName {
            return Err(Error::Protocol(format!(
                "expected RESOURCE_NAME, found {:?}",
                field.tag
            )));
        }
        let name = match field.value {
            FieldValue::String(s) => s,
            other => return Err(Error::Protocol(format!("RESOURCE_NAME carried {other:?}"))),
        };
        let (attrs, _boundary) = decode_attrs_until_boundary_or_resource_name(&mut cursor)?;
        let id = next_id;
        next_id += 1;
        resources.push(ResourceDef {
            id,
            name,
            shareable: true,
            attribute_defs: attrs
                .into_iter()
                .map(|a| AttrDef {
                    ty: match &a.value {
                        AttrValue::String(_) => AttrType::String,
                        AttrValue::Int(_) => AttrType::Int,
                        AttrValue::UInt(_) => AttrType::UInt,
                        AttrValue::Float(_) => AttrType::Float,
                    },
                    name: a.name,
                    default: a.value,
                    access: Access::READ | Access::WRITE,
                })
                .collect(),
        });
        if matches!(_boundary.tag, Tag::MessageEnd) {
            break;
        }
    }

    Ok(QueryResourcesReply { seqno, resources })
}

fn decode_attrs_until_boundary_or_resource_name(cursor: &mut Cursor) -> Result<(Vec<Attribute>, Field)> {
    let mut attrs = Vec::new();
    loop {
        let field = cursor
            .next()
            .ok_or_else(|| Error::Protocol("message ended mid-attribute-list".into()))??;
        if field.tag == Tag::ResourceName || field.tag == Tag::MessageEnd {
            return Ok((attrs, field));
        }
        if field.tag != Tag::AttributeName {
            return Err(Error::Protocol(format!(
                "expected ATTRIBUTE_NAME, RESOURCE_NAME or MESSAGE_END, found {:?}",
                field.tag
            )));
        }
        let name = match field.value {
            FieldValue::String(s) => s,
            other => return Err(Error::Protocol(format!("ATTRIBUTE_NAME carried {other:?}"))),
        };
        let value_field = cursor
            .next()
            .ok_or_else(|| Error::Protocol("missing ATTRIBUTE_VALUE".into()))??;
        if value_field.tag != Tag::AttributeValue {
            return Err(Error::Protocol("ATTRIBUTE_NAME not followed by ATTRIBUTE_VALUE".into()));
        }
        attrs.push(Attribute {
            name,
            value: decode_attr_value(value_field)?,
        });
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::proxy::ResourceFlags;

    #[test]
    fn test_create_request_roundtrip_shape() {
        let bytes = encode_create(
            1,
            RsetFlags::AUTO_RELEASE,
            "player",
            "home",
            10,
            &[ResourceRequest {
                resource_name: "speaker".into(),
                flags: ResourceFlags::MANDATORY,
                attrs: vec![Attribute {
                    name: "volume".into(),
                    value: AttrValue::Int(7),
                }],
            }],
        );
        assert_eq!(peek_request_type(&bytes).unwrap(), RequestType::CreateResourceSet);

        let mut cursor = Cursor::new(bytes);
        assert_eq!(cursor.fetch_u32(Tag::SequenceNo).unwrap(), 1);
        assert_eq!(cursor.fetch_u16(Tag::RequestType).unwrap(), RequestType::CreateResourceSet.code());
        assert_eq!(cursor.fetch_u32(Tag::ResourceFlags).unwrap(), RsetFlags::AUTO_RELEASE.bits());
        assert_eq!(cursor.fetch_u32(Tag::ResourcePriority).unwrap(), 10);
        assert_eq!(cursor.fetch_string(Tag::ClassName).unwrap(), "player");
        assert_eq!(cursor.fetch_string(Tag::ZoneName).unwrap(), "home");
        assert_eq!(cursor.fetch_string(Tag::ResourceName).unwrap(), "speaker");
        assert_eq!(cursor.fetch_u32(Tag::ResourceFlags).unwrap(), ResourceFlags::MANDATORY.bits());
        assert_eq!(cursor.fetch_string(Tag::AttributeName).unwrap(), "volume");
        assert!(cursor.fetch_marker(Tag::SectionEnd).is_err()); // next field is ATTRIBUTE_VALUE, not SECTION_END yet
    }

    #[test]
    fn test_create_reply_decode() {
        let bytes = MessageBuilder::new()
            .u32(Tag::SequenceNo, 1)
            .u16(Tag::RequestType, RequestType::CreateResourceSet.code())
            .s16(Tag::RequestStatus, 0)
            .u32(Tag::ResourceSetId, 42)
            .end();
        let reply = decode_create_reply(bytes).unwrap();
        assert!(reply.ok);
        assert_eq!(reply.resource_set_id, 42);
    }

    #[test]
    fn test_query_classes_reply_decode() {
        let bytes = MessageBuilder::new()
            .u32(Tag::SequenceNo, 2)
            .u16(Tag::RequestType, RequestType::QueryClasses.code())
            .s16(Tag::RequestStatus, 0)
            .array_of_string(Tag::ClassName, ["player", "alarm"])
            .end();
        let reply = decode_query_classes_reply(bytes).unwrap();
        assert_eq!(reply.classes.len(), 2);
        assert_eq!(reply.classes[0].name, "player");
    }
}
