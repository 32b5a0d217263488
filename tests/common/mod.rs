pub(crate) mod chain;

pub(crate) mod executor;

pub(crate) mod logging;

pub(crate) mod mem_db;
