//! Browser automation: the driver facade, its WebDriver implementation,
//! page selectors and the song form filler

pub mod driver;
pub mod form;
pub mod selectors;
pub mod webdriver;

pub use driver::{AutomationDriver, AutomationError, DriverFactory, ElementRect, ElementRef};
pub use form::SongFormFiller;
pub use webdriver::{WebDriverFactory, WebDriverSession};
