//! Behavioural core of the portfolio page: scroll-driven section tracking,
//! navigation highlighting, and the contact-form submission pipeline.

pub mod config;
pub mod contact;
pub mod mail;
pub mod navigation;
pub mod section_tracker;

pub use config::{load_settings, MailConfig, MailServiceConfig, Settings};
pub use contact::{status_message, ContactController, ContactOptions, SubmitOutcome};
pub use mail::{
    EmailJsClient, EmailJsLoader, MailCapability, MailClientLoader, MailDispatchClient,
    MissingMailClientLoader,
};
pub use navigation::{nav_links, MobileMenu, NavLink, NAV_ITEMS};
pub use section_tracker::{
    EvaluationBias, LayoutSource, SectionTracker, StaticLayout, DEFAULT_SECTIONS,
};
