use askama::Template;

use crate::models::{Provider, SessionUser};

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub error: Option<String>,
    pub provider: Option<Provider>,
    pub google_enabled: bool,
}

impl LoginTemplate {
    pub fn new(error: Option<String>, provider: Option<Provider>, google_enabled: bool) -> Self {
        Self {
            error,
            provider,
            google_enabled,
        }
    }
}

#[derive(Template)]
#[template(path = "signup.html")]
pub struct SignupTemplate {
    pub error: Option<String>,
}

#[derive(Template)]
#[template(path = "home.html")]
pub struct HomeTemplate {
    pub name: String,
    pub email: String,
}

impl From<SessionUser> for HomeTemplate {
    fn from(user: SessionUser) -> Self {
        Self {
            name: user.name,
            email: user.email,
        }
    }
}
