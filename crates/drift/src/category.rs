//! Admin Reports application categories.

use std::fmt;

/// One Admin Reports application whose activities are collected.
///
/// The set is fixed; every cycle walks [`Category::ALL`] in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Admin,
    Calendar,
    Drive,
    Login,
    Mobile,
    Token,
    Groups,
    Saml,
    Chat,
    Gplus,
    Rules,
    Jamboard,
    Meet,
    UserAccounts,
    AccessTransparency,
    GroupsEnterprise,
    Gcp,
}

impl Category {
    /// Every category, in collection order.
    pub const ALL: [Category; 17] = [
        Category::Admin,
        Category::Calendar,
        Category::Drive,
        Category::Login,
        Category::Mobile,
        Category::Token,
        Category::Groups,
        Category::Saml,
        Category::Chat,
        Category::Gplus,
        Category::Rules,
        Category::Jamboard,
        Category::Meet,
        Category::UserAccounts,
        Category::AccessTransparency,
        Category::GroupsEnterprise,
        Category::Gcp,
    ];

    /// Application name as used in the Reports API path.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Admin => "admin",
            Category::Calendar => "calendar",
            Category::Drive => "drive",
            Category::Login => "login",
            Category::Mobile => "mobile",
            Category::Token => "token",
            Category::Groups => "groups",
            Category::Saml => "saml",
            Category::Chat => "chat",
            Category::Gplus => "gplus",
            Category::Rules => "rules",
            Category::Jamboard => "jamboard",
            Category::Meet => "meet",
            Category::UserAccounts => "user_accounts",
            Category::AccessTransparency => "access_transparency",
            Category::GroupsEnterprise => "groups_enterprise",
            Category::Gcp => "gcp",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
