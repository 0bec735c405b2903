// Askama page templates for the browser-facing routes.

use askama::Template;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use tracing::error;

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub error: Option<String>,
}

#[derive(Template)]
#[template(path = "register.html")]
pub struct RegisterTemplate {
    pub error: Option<String>,
}

#[derive(Template)]
#[template(path = "dashboard.html")]
pub struct DashboardTemplate {
    pub username: String,
    pub display_name: String,
    pub profile_picture: String,
}

pub fn render_template<T: Template>(status: StatusCode, template: T) -> Response {
    match template.render() {
        Ok(html) => (status, Html(html)).into_response(),
        Err(e) => {
            error!(error = %e, "template render failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Template error").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_renders_error_when_present() {
        let html = LoginTemplate {
            error: Some("Invalid login credentials".into()),
        }
        .render()
        .unwrap();
        assert!(html.contains("Invalid login credentials"));
        assert!(html.contains("action=\"/login\""));
    }

    #[test]
    fn dashboard_escapes_user_content() {
        let html = DashboardTemplate {
            username: "alice".into(),
            display_name: "<script>x</script>".into(),
            profile_picture: "/images/default-avatar.jpg".into(),
        }
        .render()
        .unwrap();
        assert!(!html.contains("<script>x</script>"));
        assert!(html.contains("alice"));
    }
}
