//! Live event types.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::{Error, Result};

/// Event name for coalesced publication updates.
pub const BATCHED_PUBLICATION_UPDATES: &str = "batched_publication_updates";
pub const PUBLICATION_DELETED: &str = "publication_deleted";
pub const COMMENT_ADDED: &str = "comment_added";
pub const COMMENT_UPDATED: &str = "comment_updated";
pub const COMMENT_DELETED: &str = "comment_deleted";
pub const LIKE_UPDATE: &str = "like_update";

/// Payload key carrying the publication id in room events. Existing clients
/// read the Spanish spelling, as they do for room names.
pub const PUBLICATION_ID_KEY: &str = "publicacion_id";

/// Name of the room that follows a single publication's comments and likes.
pub fn publication_room(publication_id: i64) -> String {
    format!("publicacion_{publication_id}")
}

/// Live events emitted by request handlers after successful mutations.
///
/// Publication changes are coalesced and flushed on a timer; everything else
/// is pushed to clients as soon as it is emitted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveEvent {
    /// A publication was created or changed. `publication` is the full
    /// publication document as clients render it.
    PublicationChanged {
        publication_id: i64,
        publication: Value,
    },

    /// A publication and everything attached to it was removed.
    PublicationDeleted { publication_id: i64 },

    CommentAdded { publication_id: i64, comment: Value },

    CommentUpdated { publication_id: i64, comment: Value },

    CommentDeleted {
        publication_id: i64,
        comment_id: i64,
    },

    /// The like count of a publication changed because `user_id` liked or
    /// unliked it.
    LikeUpdated {
        publication_id: i64,
        likes: i64,
        user_id: i64,
        user_has_liked: bool,
    },
}

/// How a live event reaches clients.
#[derive(Clone, Debug, PartialEq)]
pub enum Delivery {
    /// Coalesced under `key` until the next flush.
    Batched { key: i64, payload: Value },
    /// Published right away. `room: None` targets every client.
    Immediate {
        name: &'static str,
        room: Option<String>,
        payload: Value,
    },
}

impl LiveEvent {
    /// Creates a PublicationChanged event.
    pub fn publication_changed(publication_id: i64, publication: Value) -> Self {
        Self::PublicationChanged {
            publication_id,
            publication,
        }
    }

    /// Creates a PublicationDeleted event.
    pub fn publication_deleted(publication_id: i64) -> Self {
        Self::PublicationDeleted { publication_id }
    }

    /// Creates a CommentAdded event.
    pub fn comment_added(publication_id: i64, comment: Value) -> Self {
        Self::CommentAdded {
            publication_id,
            comment,
        }
    }

    /// Creates a CommentUpdated event.
    pub fn comment_updated(publication_id: i64, comment: Value) -> Self {
        Self::CommentUpdated {
            publication_id,
            comment,
        }
    }

    /// Creates a CommentDeleted event.
    pub fn comment_deleted(publication_id: i64, comment_id: i64) -> Self {
        Self::CommentDeleted {
            publication_id,
            comment_id,
        }
    }

    /// Creates a LikeUpdated event.
    pub fn like_updated(publication_id: i64, likes: i64, user_id: i64, user_has_liked: bool) -> Self {
        Self::LikeUpdated {
            publication_id,
            likes,
            user_id,
            user_has_liked,
        }
    }

    pub fn publication_id(&self) -> i64 {
        match self {
            Self::PublicationChanged { publication_id, .. }
            | Self::PublicationDeleted { publication_id }
            | Self::CommentAdded { publication_id, .. }
            | Self::CommentUpdated { publication_id, .. }
            | Self::CommentDeleted { publication_id, .. }
            | Self::LikeUpdated { publication_id, .. } => *publication_id,
        }
    }

    /// Checks that embedded documents are JSON objects and that a changed
    /// publication carries its own id.
    ///
    /// Batches are keyed by `publication_id` while clients key by the
    /// document's `id`; the two must agree or one publication could show up
    /// twice in a batch.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::PublicationChanged { publication, .. } if !publication.is_object() => Err(
                Error::InvalidPayload("publication must be a JSON object".to_string()),
            ),
            Self::PublicationChanged {
                publication_id,
                publication,
            } => match publication.get("id").and_then(Value::as_i64) {
                Some(id) if id == *publication_id => Ok(()),
                Some(id) => Err(Error::InvalidPayload(format!(
                    "publication id {id} does not match publication_id {publication_id}"
                ))),
                None => Err(Error::InvalidPayload(
                    "publication must carry an integer id".to_string(),
                )),
            },
            Self::CommentAdded { comment, .. } | Self::CommentUpdated { comment, .. }
                if !comment.is_object() =>
            {
                Err(Error::InvalidPayload(
                    "comment must be a JSON object".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }

    /// Resolves the event name, target room, and wire payload.
    pub fn into_delivery(self) -> Delivery {
        match self {
            Self::PublicationChanged {
                publication_id,
                publication,
            } => Delivery::Batched {
                key: publication_id,
                payload: publication,
            },
            Self::PublicationDeleted { publication_id } => Delivery::Immediate {
                name: PUBLICATION_DELETED,
                room: None,
                payload: json!({
                    "id": publication_id,
                    "message": "Publicación eliminada.",
                }),
            },
            Self::CommentAdded {
                publication_id,
                comment,
            } => Delivery::Immediate {
                name: COMMENT_ADDED,
                room: Some(publication_room(publication_id)),
                payload: json!({ PUBLICATION_ID_KEY: publication_id, "comment": comment }),
            },
            Self::CommentUpdated {
                publication_id,
                comment,
            } => Delivery::Immediate {
                name: COMMENT_UPDATED,
                room: Some(publication_room(publication_id)),
                payload: json!({ PUBLICATION_ID_KEY: publication_id, "comment": comment }),
            },
            Self::CommentDeleted {
                publication_id,
                comment_id,
            } => Delivery::Immediate {
                name: COMMENT_DELETED,
                room: Some(publication_room(publication_id)),
                payload: json!({ "id": comment_id, PUBLICATION_ID_KEY: publication_id }),
            },
            Self::LikeUpdated {
                publication_id,
                likes,
                user_id,
                user_has_liked,
            } => Delivery::Immediate {
                name: LIKE_UPDATE,
                room: Some(publication_room(publication_id)),
                payload: json!({
                    PUBLICATION_ID_KEY: publication_id,
                    "likes": likes,
                    "user_id": user_id,
                    "user_has_liked": user_has_liked,
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_event_deserialization() {
        let raw = r#"{"type":"like_updated","publication_id":7,"likes":3,"user_id":11,"user_has_liked":true}"#;
        let event: LiveEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event, LiveEvent::like_updated(7, 3, 11, true));

        let json = serde_json::to_string(&LiveEvent::publication_deleted(9)).unwrap();
        assert!(json.contains("publication_deleted"));
    }

    #[test]
    fn test_publication_changed_is_batched_by_id() {
        let event = LiveEvent::publication_changed(42, json!({"id": 42, "title": "A"}));
        assert_eq!(event.publication_id(), 42);
        assert_eq!(
            event.into_delivery(),
            Delivery::Batched {
                key: 42,
                payload: json!({"id": 42, "title": "A"}),
            }
        );
    }

    #[test]
    fn test_publication_deleted_targets_everyone() {
        match LiveEvent::publication_deleted(5).into_delivery() {
            Delivery::Immediate {
                name,
                room,
                payload,
            } => {
                assert_eq!(name, PUBLICATION_DELETED);
                assert_eq!(room, None);
                assert_eq!(payload["id"], 5);
                assert_eq!(payload["message"], "Publicación eliminada.");
            }
            other => panic!("Expected immediate delivery, got {other:?}"),
        }
    }

    #[test]
    fn test_comment_events_target_publication_room() {
        match LiveEvent::comment_deleted(5, 80).into_delivery() {
            Delivery::Immediate {
                name,
                room,
                payload,
            } => {
                assert_eq!(name, COMMENT_DELETED);
                assert_eq!(room.as_deref(), Some("publicacion_5"));
                assert_eq!(payload, json!({"id": 80, "publicacion_id": 5}));
            }
            other => panic!("Expected immediate delivery, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_non_object_documents() {
        assert!(LiveEvent::publication_changed(1, json!("text")).validate().is_err());
        assert!(LiveEvent::publication_changed(1, json!({"id": 1})).validate().is_ok());
        assert!(LiveEvent::comment_added(1, json!([1, 2])).validate().is_err());
        assert!(LiveEvent::comment_updated(1, json!({"id": 2})).validate().is_ok());
        assert!(LiveEvent::like_updated(1, 0, 2, false).validate().is_ok());
    }

    #[test]
    fn test_validate_requires_matching_publication_id() {
        let mismatched = LiveEvent::publication_changed(1, json!({"id": 2, "title": "stale"}));
        match mismatched.validate() {
            Err(Error::InvalidPayload(msg)) => assert!(msg.contains("does not match")),
            other => panic!("Expected InvalidPayload, got {other:?}"),
        }

        let missing = LiveEvent::publication_changed(1, json!({"title": "no id"}));
        assert!(matches!(missing.validate(), Err(Error::InvalidPayload(_))));

        let stringly = LiveEvent::publication_changed(1, json!({"id": "1"}));
        assert!(matches!(stringly.validate(), Err(Error::InvalidPayload(_))));
    }

    #[test]
    fn test_room_events_use_client_wire_names() {
        assert_eq!(publication_room(12), "publicacion_12");
        match LiveEvent::like_updated(12, 4, 3, false).into_delivery() {
            Delivery::Immediate { payload, .. } => {
                assert_eq!(payload["publicacion_id"], 12);
                assert_eq!(payload["user_has_liked"], false);
            }
            other => panic!("Expected immediate delivery, got {other:?}"),
        }
    }
}
