//! Demonstration front-end for the `rp-oidc` login flow.
//!
//! Serves a landing page, starts logins (plain and auto-login), receives the IdP
//! redirect on `/return` and shows the verified identity.

pub mod config;
pub mod render;
pub mod routes;

pub use config::Config;
pub use render::{HtmlRenderer, Page, Renderer};
pub use routes::{AppState, router};
