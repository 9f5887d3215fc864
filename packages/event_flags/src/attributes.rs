use crate::{Error, Result};

/// Raw `pshared` value for objects that are local to the creating process.
///
/// This is the only sharing mode event flags support.
pub const NOT_PROCESS_SHARED: u32 = 0x200;

/// Wake-ordering discipline for contexts queued on an event flag.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum Protocol {
    /// Waiters are served in arrival order.
    #[default]
    Fifo,

    /// Waiters are served in ascending priority order.
    Priority,

    /// Same ordering as [`Protocol::Priority`].
    ///
    /// An event flag owns nothing whose priority could be lent to a waiter, so only the
    /// ordering takes effect.
    PriorityInherit,

    /// Same ordering as [`Protocol::Priority`].
    Retry,
}

impl Protocol {
    /// Decodes a raw guest protocol value.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0x1 => Some(Self::Fifo),
            0x2 => Some(Self::Priority),
            0x3 => Some(Self::PriorityInherit),
            0x4 => Some(Self::Retry),
            _ => None,
        }
    }

    /// The raw guest value of this protocol.
    #[must_use]
    pub const fn to_raw(self) -> u32 {
        match self {
            Self::Fifo => 0x1,
            Self::Priority => 0x2,
            Self::PriorityInherit => 0x3,
            Self::Retry => 0x4,
        }
    }

    /// Whether waiters are ordered by priority rather than by arrival.
    #[must_use]
    pub const fn is_priority_ordered(self) -> bool {
        !matches!(self, Self::Fifo)
    }
}

/// How many contexts may be blocked on an event flag at the same time.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum WaiterCardinality {
    /// At most one blocked context.
    Single,

    /// Any number of blocked contexts.
    #[default]
    Multiple,
}

impl WaiterCardinality {
    /// Decodes a raw guest waiter type.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0x1_0000 => Some(Self::Single),
            0x2_0000 => Some(Self::Multiple),
            _ => None,
        }
    }

    /// The raw guest value of this waiter type.
    #[must_use]
    pub const fn to_raw(self) -> u32 {
        match self {
            Self::Single => 0x1_0000,
            Self::Multiple => 0x2_0000,
        }
    }
}

/// The attribute record a guest passes when creating an event flag, before validation.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[expect(
    clippy::exhaustive_structs,
    reason = "mirrors a fixed guest memory layout"
)]
pub struct RawEventFlagAttributes {
    /// Raw [`Protocol`] value.
    pub protocol: u32,

    /// Sharing mode. Must be [`NOT_PROCESS_SHARED`].
    pub pshared: u32,

    /// Key for named instantiation. Must be zero.
    pub ipc_key: u64,

    /// Reserved flags. Must be zero.
    pub flags: i32,

    /// Raw [`WaiterCardinality`] value.
    pub kind: u32,

    /// Opaque name tag, eight bytes packed into an integer.
    pub name: u64,
}

/// Validated, immutable configuration of an event flag.
///
/// Use [`EventFlagAttributes::builder()`] to create one in host code, or convert a
/// [`RawEventFlagAttributes`] received from a guest.
///
/// # Example
///
/// ```
/// use event_flags::{EventFlagAttributes, Protocol, WaiterCardinality};
///
/// let attributes = EventFlagAttributes::builder()
///     .protocol(Protocol::Priority)
///     .waiter_cardinality(WaiterCardinality::Single)
///     .name(u64::from_be_bytes(*b"evflag01"))
///     .build();
///
/// assert_eq!(attributes.protocol(), Protocol::Priority);
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct EventFlagAttributes {
    protocol: Protocol,
    waiter_cardinality: WaiterCardinality,
    name: u64,
}

impl EventFlagAttributes {
    /// Starts building a set of attributes. Defaults to FIFO, multiple waiters, name zero.
    #[must_use]
    pub fn builder() -> EventFlagAttributesBuilder {
        EventFlagAttributesBuilder::new()
    }

    /// The wake-ordering protocol.
    #[must_use]
    pub const fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// How many contexts may block at once.
    #[must_use]
    pub const fn waiter_cardinality(&self) -> WaiterCardinality {
        self.waiter_cardinality
    }

    /// The informational name tag.
    #[must_use]
    pub const fn name(&self) -> u64 {
        self.name
    }
}

impl TryFrom<RawEventFlagAttributes> for EventFlagAttributes {
    type Error = Error;

    fn try_from(raw: RawEventFlagAttributes) -> Result<Self> {
        let protocol = Protocol::from_raw(raw.protocol).ok_or(Error::InvalidArgument {
            argument: "protocol",
            value: u64::from(raw.protocol),
        })?;

        if raw.pshared != NOT_PROCESS_SHARED {
            return Err(Error::InvalidArgument {
                argument: "pshared",
                value: u64::from(raw.pshared),
            });
        }

        if raw.ipc_key != 0 {
            return Err(Error::InvalidArgument {
                argument: "ipc_key",
                value: raw.ipc_key,
            });
        }

        if raw.flags != 0 {
            return Err(Error::InvalidArgument {
                argument: "flags",
                value: u64::from(u32::from_ne_bytes(raw.flags.to_ne_bytes())),
            });
        }

        let waiter_cardinality =
            WaiterCardinality::from_raw(raw.kind).ok_or(Error::InvalidArgument {
                argument: "type",
                value: u64::from(raw.kind),
            })?;

        Ok(Self {
            protocol,
            waiter_cardinality,
            name: raw.name,
        })
    }
}

impl From<EventFlagAttributes> for RawEventFlagAttributes {
    fn from(attributes: EventFlagAttributes) -> Self {
        Self {
            protocol: attributes.protocol.to_raw(),
            pshared: NOT_PROCESS_SHARED,
            ipc_key: 0,
            flags: 0,
            kind: attributes.waiter_cardinality.to_raw(),
            name: attributes.name,
        }
    }
}

/// Creates instances of [`EventFlagAttributes`].
///
/// Use [`EventFlagAttributes::builder()`] to obtain one.
#[derive(Debug)]
#[must_use]
pub struct EventFlagAttributesBuilder {
    attributes: EventFlagAttributes,
}

impl EventFlagAttributesBuilder {
    fn new() -> Self {
        Self {
            attributes: EventFlagAttributes::default(),
        }
    }

    /// Sets the wake-ordering protocol.
    pub fn protocol(self, protocol: Protocol) -> Self {
        Self {
            attributes: EventFlagAttributes {
                protocol,
                ..self.attributes
            },
        }
    }

    /// Sets how many contexts may block at once.
    pub fn waiter_cardinality(self, waiter_cardinality: WaiterCardinality) -> Self {
        Self {
            attributes: EventFlagAttributes {
                waiter_cardinality,
                ..self.attributes
            },
        }
    }

    /// Sets the informational name tag.
    pub fn name(self, name: u64) -> Self {
        Self {
            attributes: EventFlagAttributes {
                name,
                ..self.attributes
            },
        }
    }

    /// Finishes building.
    #[must_use]
    pub fn build(self) -> EventFlagAttributes {
        self.attributes
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn valid_raw() -> RawEventFlagAttributes {
        RawEventFlagAttributes {
            protocol: Protocol::Retry.to_raw(),
            pshared: NOT_PROCESS_SHARED,
            ipc_key: 0,
            flags: 0,
            kind: WaiterCardinality::Single.to_raw(),
            name: 0x1234,
        }
    }

    #[test]
    fn builder_defaults() {
        let attributes = EventFlagAttributes::builder().build();

        assert_eq!(attributes.protocol(), Protocol::Fifo);
        assert_eq!(attributes.waiter_cardinality(), WaiterCardinality::Multiple);
        assert_eq!(attributes.name(), 0);
    }

    #[test]
    fn valid_raw_attributes_convert() {
        let attributes = EventFlagAttributes::try_from(valid_raw()).unwrap();

        assert_eq!(attributes.protocol(), Protocol::Retry);
        assert_eq!(attributes.waiter_cardinality(), WaiterCardinality::Single);
        assert_eq!(attributes.name(), 0x1234);
    }

    #[test]
    fn unknown_protocol_is_rejected() {
        let raw = RawEventFlagAttributes {
            protocol: 0x5,
            ..valid_raw()
        };

        assert_eq!(
            EventFlagAttributes::try_from(raw),
            Err(Error::InvalidArgument {
                argument: "protocol",
                value: 0x5
            })
        );
    }

    #[test]
    fn process_shared_is_rejected() {
        let raw = RawEventFlagAttributes {
            pshared: 0x100,
            ..valid_raw()
        };

        assert!(matches!(
            EventFlagAttributes::try_from(raw),
            Err(Error::InvalidArgument {
                argument: "pshared",
                ..
            })
        ));
    }

    #[test]
    fn ipc_key_is_rejected() {
        let raw = RawEventFlagAttributes {
            ipc_key: 0xdead_beef,
            ..valid_raw()
        };

        assert!(matches!(
            EventFlagAttributes::try_from(raw),
            Err(Error::InvalidArgument {
                argument: "ipc_key",
                ..
            })
        ));
    }

    #[test]
    fn flags_are_rejected() {
        let raw = RawEventFlagAttributes {
            flags: -1,
            ..valid_raw()
        };

        assert_eq!(
            EventFlagAttributes::try_from(raw),
            Err(Error::InvalidArgument {
                argument: "flags",
                value: 0xffff_ffff
            })
        );
    }

    #[test]
    fn unknown_waiter_type_is_rejected() {
        let raw = RawEventFlagAttributes {
            kind: 0x3_0000,
            ..valid_raw()
        };

        assert!(matches!(
            EventFlagAttributes::try_from(raw),
            Err(Error::InvalidArgument {
                argument: "type",
                ..
            })
        ));
    }

    #[test]
    fn raw_from_attributes_is_valid() {
        let attributes = EventFlagAttributes::builder()
            .protocol(Protocol::PriorityInherit)
            .name(7)
            .build();

        let raw = RawEventFlagAttributes::from(attributes);

        assert_eq!(EventFlagAttributes::try_from(raw), Ok(attributes));
    }

    #[test]
    fn only_fifo_is_arrival_ordered() {
        assert!(!Protocol::Fifo.is_priority_ordered());
        assert!(Protocol::Priority.is_priority_ordered());
        assert!(Protocol::PriorityInherit.is_priority_ordered());
        assert!(Protocol::Retry.is_priority_ordered());
    }
}
