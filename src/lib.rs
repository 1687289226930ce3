//! Core of a USB top-level device driver: descriptor walking, interface
//! arbitration, control-transfer bridging and completion pumping.
//!
//! This crate never talks to silicon. It sits between a caller-supplied
//! [`hci::HostController`] collaborator and caller-supplied
//! [`child::ChildSpawner`]/[`child::DeviceManager`] collaborators, and owns
//! everything in between: reading a newly attached device's descriptors,
//! arbitrating which interfaces get auto-published as children versus
//! explicitly claimed, and bridging the host controller's asynchronous
//! completion model onto both a synchronous control-transfer call and an
//! ordered completion queue for client transfers.

mod bitset;
pub mod child;
mod control;
mod descriptor_store;
pub mod device;
pub mod error;
pub mod facade;
pub mod hci;
mod interface_status;
#[cfg(test)]
pub mod mocks;
mod pool;
mod pump;
mod queue;
mod walker;
pub mod wire;
