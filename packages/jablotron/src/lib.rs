//! Jablotron/Turris Dongle support: serial framing and command
//! protocol, the static gadget table and per-type report decoder, and
//! the report/token model they share.

pub mod controller;
pub mod gadget;
pub mod report;

pub mod prelude {
    pub use crate::controller::{Beep, ControllerConfig, JablotronController};
    pub use crate::gadget::{primary_address, secondary_address, resolve, parse, GadgetInfo, GadgetType};
    pub use crate::report::JablotronReport;
}
