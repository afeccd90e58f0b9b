//! Navigation highlighting derived from the active section.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavItem {
    pub section: &'static str,
    pub label: &'static str,
}

pub const NAV_ITEMS: [NavItem; 5] = [
    NavItem {
        section: "intro",
        label: "Home",
    },
    NavItem {
        section: "about",
        label: "About",
    },
    NavItem {
        section: "experience",
        label: "Experience",
    },
    NavItem {
        section: "projects",
        label: "Projects",
    },
    NavItem {
        section: "contact",
        label: "Contact",
    },
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavLink {
    pub label: &'static str,
    pub href: String,
    pub is_active: bool,
}

pub fn section_href(section: &str) -> String {
    format!("#{section}")
}

pub fn nav_links(active: &str) -> Vec<NavLink> {
    NAV_ITEMS
        .iter()
        .map(|item| NavLink {
            label: item.label,
            href: section_href(item.section),
            is_active: item.section == active,
        })
        .collect()
}

/// Collapsible menu shown on narrow viewports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MobileMenu {
    open: bool,
}

impl MobileMenu {
    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn toggle(&mut self) {
        self.open = !self.open;
    }

    /// Closes the menu and returns the anchor to jump to.
    pub fn select(&mut self, section: &str) -> String {
        self.open = false;
        section_href(section)
    }
}
