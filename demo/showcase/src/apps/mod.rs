// Demo apps
//
// Each module declares its components and pages; `build` picks one.

pub mod clock;
pub mod counter;
pub mod menu;
pub mod search;
pub mod tables;

use std::time::Duration;

use clap::ValueEnum;
use sundash_core::{App, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Demo {
    Counter,
    Clock,
    Menu,
    Search,
    Tables,
}

pub fn build(demo: Demo, tick_period: Duration) -> Result<App> {
    match demo {
        Demo::Counter => counter::app(),
        Demo::Clock => clock::app(tick_period),
        Demo::Menu => menu::app(),
        Demo::Search => search::app(),
        Demo::Tables => tables::app(),
    }
}
