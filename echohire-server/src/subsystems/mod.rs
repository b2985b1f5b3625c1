pub mod dialogue;
pub mod feedback;
pub mod lifecycle;
pub mod reconcile;
pub mod transcript;
pub mod webhook;
