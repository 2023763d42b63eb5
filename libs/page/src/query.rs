/// One typed query strategy against the page model. Values are matched
/// case-insensitively; host UI attribute casing is not guaranteed stable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    AttrPresent { name: String },
    AttrEquals { name: String, value: String },
    AttrContains { name: String, value: String },
    AttrPrefix { name: String, value: String },
    Tag { name: String },
    ClassToken { token: String },
}

impl Query {
    pub fn attr_present(name: &str) -> Self {
        Self::AttrPresent {
            name: name.to_string(),
        }
    }

    pub fn attr_equals(name: &str, value: &str) -> Self {
        Self::AttrEquals {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    pub fn attr_contains(name: &str, value: &str) -> Self {
        Self::AttrContains {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    pub fn attr_prefix(name: &str, value: &str) -> Self {
        Self::AttrPrefix {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    pub fn tag(name: &str) -> Self {
        Self::Tag {
            name: name.to_string(),
        }
    }

    pub fn class_token(token: &str) -> Self {
        Self::ClassToken {
            token: token.to_string(),
        }
    }
}
