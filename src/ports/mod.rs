//! Port traits: the seams between the portfolio-construction core and its
//! external collaborators.

pub mod config_port;
pub mod data_port;
pub mod weights_port;
