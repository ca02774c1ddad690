pub mod config;
pub mod errors;
pub mod exit_gate;
pub mod lock;
pub mod logging;
pub mod pipeline;
pub mod poller;
pub mod protocol;
pub mod resolvers;
pub mod review;
pub mod skills;
pub mod store;
pub mod validate;
