//! Whether a card and a door may hold a relation at all.

use crate::model::{Card, Controller, Door};

/// Type and sync-mode compatibility of `card` with `door` on `controller`.
///
/// - The door's card-type filter must accept the card's type.
/// - A cloud card never gets a local relation on a controller whose card list
///   lives in an external database; those doors are fed by the cloud channel.
/// - Non-cloud cards are unaffected by the controller's sync mode.
pub fn door_compatible(card: &Card, door: &Door, controller: &Controller) -> bool {
  if !door.card_type.accepts(card.card_type) {
    return false;
  }
  !(card.cloud_card && controller.external_db)
}

/// An active card with an owner.
pub fn card_ready(card: &Card) -> bool { card.active && card.owner().is_some() }

/// Both checks the reconciler applies before keeping a relation.
pub fn relation_allowed(card: &Card, door: &Door, controller: &Controller) -> bool {
  card_ready(card) && door_compatible(card, door, controller)
}
