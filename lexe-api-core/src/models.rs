/// Request / response types used in APIs for top level commands.
pub mod command;
/// Request / response types used in APIs related to NWC.
pub mod nwc;
/// Request / response types used in APIs to/from node runners.
pub mod runner;
