pub mod alignment;
pub mod collaborators;
pub mod mecanum;
pub mod offset_history;
