pub mod members;
pub mod messages;
pub mod projects;
pub mod sprints;
pub mod tasks;
