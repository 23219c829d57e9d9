//! In-process fleet simulation for testing without SSH, tc/netem or systemd
//!
//! The simulated fleet answers benchmark commands with canned tool output,
//! tracks the impairment applied on each machine and can be told to break a
//! VPN on a machine, permanently or for a number of attempts.

pub mod fleet;

pub use fleet::SimulatedFleet;
