//! Which side of a session is looking at it.
//!
//! A session is stored once but rendered twice: the merchant sees the
//! counterpart, the counterpart sees the merchant. Each side also has its own
//! unread count.

use chowline_types::chat::{ChatSession, Participant};
use chowline_types::role::{CounterpartRole, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Viewpoint {
    /// The merchant side, acting through its owning user.
    Merchant { merchant_id: i64, user_id: i64 },
    /// The customer or courier side.
    Counterpart { role: CounterpartRole, user_id: i64 },
}

impl Viewpoint {
    /// The receiver identity this viewer's unread messages are addressed to.
    pub fn participant(&self) -> Participant {
        match *self {
            Viewpoint::Merchant { user_id, .. } => Participant::new(user_id, Role::Merchant),
            Viewpoint::Counterpart { role, user_id } => Participant::new(user_id, role.role()),
        }
    }

    /// The counterpart as stored on the session, for the merchant side.
    ///
    /// Returns `None` for counterpart viewers, whose peer (the merchant's
    /// owning user) is not stored on the session and must be looked up.
    pub fn stored_peer(&self, session: &ChatSession) -> Option<Participant> {
        match self {
            Viewpoint::Merchant { .. } => Some(Participant::new(
                session.counterpart_id,
                session.counterpart_role.role(),
            )),
            Viewpoint::Counterpart { .. } => None,
        }
    }
}
