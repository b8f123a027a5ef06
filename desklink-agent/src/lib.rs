pub mod capture;
pub mod input;
pub mod prompt;
pub mod run;

#[cfg(feature = "platform")]
pub mod platform;
