//! Catalog of marketplace events subscribers can receive.
//!
//! Webhook subscriptions and enqueued deliveries are validated against this
//! catalog; event names outside it are rejected at the edge.

/// A subscribable event with a human-readable description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventDescriptor {
    /// Dotted event name, e.g. `listing.created`.
    pub name: &'static str,
    /// Short description shown to integrators.
    pub description: &'static str,
}

/// All events the marketplace emits to webhook subscribers.
pub const EVENT_CATALOG: &[EventDescriptor] = &[
    EventDescriptor {
        name: "listing.created",
        description: "A new listing was created",
    },
    EventDescriptor {
        name: "listing.published",
        description: "A listing passed moderation and became publicly visible",
    },
    EventDescriptor {
        name: "reservation.confirmed",
        description: "A buyer reservation was confirmed by the seller",
    },
    EventDescriptor {
        name: "reservation.completed",
        description: "A reservation was fulfilled and closed",
    },
    EventDescriptor {
        name: "reservation.cancelled",
        description: "A reservation was cancelled by either party",
    },
    EventDescriptor {
        name: "rating.created",
        description: "A rating was left after a completed reservation",
    },
    EventDescriptor {
        name: "message.received",
        description: "A chat message arrived for one of your listings",
    },
];

/// Returns the full event catalog.
pub fn available_events() -> &'static [EventDescriptor] {
    EVENT_CATALOG
}

/// Returns whether `name` is a catalog event.
pub fn is_known_event(name: &str) -> bool {
    EVENT_CATALOG.iter().any(|event| event.name == name)
}
