//! Local note bookkeeping: the store itself and input-note selection.

mod selection;
mod store;

pub use selection::{NoteReservation, ReservationLedger, Selection, select_notes};
pub use store::NoteStore;
