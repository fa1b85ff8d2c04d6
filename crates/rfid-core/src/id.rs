//! Opaque integer handles for every entity in the access graph.
//!
//! Handles are allocated in creation order by the backing store, so comparing
//! two handles of the same kind tells which entity was created later.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! entity_id {
  ($(#[$meta:meta])* $name:ident, $kind:literal) => {
    $(#[$meta])*
    #[derive(
      Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
      Deserialize,
    )]
    #[serde(transparent)]
    pub struct $name(pub i64);

    impl $name {
      /// Entity kind label used in error messages and logs.
      pub const KIND: &'static str = $kind;
    }

    impl fmt::Display for $name {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", $kind, self.0)
      }
    }
  };
}

entity_id!(EmployeeId, "employee");
entity_id!(ContactId, "contact");
entity_id!(CardId, "card");
entity_id!(CardTypeId, "card_type");
entity_id!(
  /// Larger values belong to more recently created groups.
  AccessGroupId,
  "access_group"
);
entity_id!(DepartmentId, "department");
entity_id!(DoorId, "door");
entity_id!(ControllerId, "controller");
entity_id!(WebstackId, "webstack");
entity_id!(TimeScheduleId, "time_schedule");

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn display_includes_kind() {
    assert_eq!(DoorId(7).to_string(), "door#7");
    assert_eq!(AccessGroupId(3).to_string(), "access_group#3");
  }

  #[test]
  fn ids_serialize_transparently() {
    let json = serde_json::to_string(&CardId(42)).unwrap();
    assert_eq!(json, "42");
  }
}
