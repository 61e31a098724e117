//! Field tags (spec.md §6). The codec itself is agnostic to message
//! semantics (spec.md §4.C); this is simply the numeric vocabulary
//! every message in this protocol draws its fields' tags from.

/// A field's numeric tag, drawn from spec.md §6's table (plus
/// `RESOURCE_ID`, implied by the Event message shape's
/// `{ RESOURCE_ID, RESOURCE_NAME, ... }` repeated group).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Tag {
    SequenceNo = 1,
    RequestType = 2,
    RequestStatus = 3,
    ClassName = 4,
    ZoneName = 5,
    ResourceName = 6,
    ResourceFlags = 7,
    ResourceSetId = 8,
    ResourceState = 9,
    ResourceGrant = 10,
    ResourceAdvice = 11,
    ResourcePriority = 12,
    AttributeName = 13,
    AttributeValue = 14,
    SectionEnd = 15,
    ResourceId = 16,
    MessageEnd = 0xffff,
}

impl Tag {
    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn from_code(code: u16) -> Option<Tag> {
        Some(match code {
            1 => Tag::SequenceNo,
            2 => Tag::RequestType,
            3 => Tag::RequestStatus,
            4 => Tag::ClassName,
            5 => Tag::ZoneName,
            6 => Tag::ResourceName,
            7 => Tag::ResourceFlags,
            8 => Tag::ResourceSetId,
            9 => Tag::ResourceState,
            10 => Tag::ResourceGrant,
            11 => Tag::ResourceAdvice,
            12 => Tag::ResourcePriority,
            13 => Tag::AttributeName,
            14 => Tag::AttributeValue,
            15 => Tag::SectionEnd,
            16 => Tag::ResourceId,
            0xffff => Tag::MessageEnd,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_code_roundtrip() {
        for tag in [
            Tag::SequenceNo,
            Tag::RequestType,
            Tag::RequestStatus,
            Tag::ClassName,
            Tag::ZoneName,
            Tag::ResourceName,
            Tag::ResourceFlags,
            Tag::ResourceSetId,
            Tag::ResourceState,
            Tag::ResourceGrant,
            Tag::ResourceAdvice,
            Tag::ResourcePriority,
            Tag::AttributeName,
            Tag::AttributeValue,
            Tag::SectionEnd,
            Tag::ResourceId,
            Tag::MessageEnd,
        ] {
            assert_eq!(Tag::from_code(tag.code()), Some(tag));
        }
    }

    #[test]
    fn test_unknown_code() {
        assert_eq!(Tag::from_code(9999), None);
    }
}
