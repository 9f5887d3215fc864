mod clock_client;
mod clock_facade;

pub(crate) use clock_client::*;
pub(crate) use clock_facade::*;
