//! Server-rendered HTML views

use axum::Form;
use axum::extract::rejection::FormRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use chrono::DateTime;
use serde::Deserialize;
use serde_json::Value;

use super::dolibarr_handlers::{create_project_for, events_owned_by};
use super::error::ApiError;
use super::extract::CurrentSession;
use super::state::AppState;
use crate::auth::User;
use crate::dolibarr::CreateEventRequest;

/// Path of the events page
pub const EVENTS_PAGE_PATH: &str = "/dolibarr";

/// Click counter owned by the home view
///
/// The value is carried in the query string, so each render starts from the
/// count in the link that was followed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counter {
    count: i64,
}

impl Counter {
    pub fn new(count: i64) -> Self {
        Self { count }
    }

    pub fn count(&self) -> i64 {
        self.count
    }

    pub fn increment(&mut self) {
        self.count = self.count.saturating_add(1);
    }

    pub fn decrement(&mut self) {
        self.count = self.count.saturating_sub(1);
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct HomeParams {
    #[serde(default)]
    pub count: Option<String>,
}

impl HomeParams {
    /// Counter state from `?count=`; anything unparseable starts at zero
    pub fn counter(&self) -> Counter {
        let count = self
            .count
            .as_deref()
            .and_then(|raw| raw.trim().parse().ok())
            .unwrap_or_default();
        Counter::new(count)
    }
}

/// Handler for the home page
pub async fn home_handler(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Query(params): Query<HomeParams>,
) -> Html<String> {
    let auth_path = &state.config.settings.server.auth_path;

    let greeting = match &session {
        Some(session) => format!(
            r#"<h1>Welcome {}</h1>
        <p><a href="{}">Mes événements</a></p>
        <form method="post" action="{}/signout">
            <button type="submit" class="button">Sign out</button>
        </form>"#,
            escape_html(&session.user.name),
            EVENTS_PAGE_PATH,
            auth_path
        ),
        None => format!(
            r#"<h1>Valhalla</h1>
        <a href="{}/signin" class="button">Sign in</a>"#,
            auth_path
        ),
    };

    Html(page("Valhalla", &format!("{}\n{}", greeting, counter_html(params.counter()))))
}

#[derive(Debug, Default, Deserialize)]
pub struct EventsPageParams {
    /// Set after a successful creation redirect
    #[serde(default)]
    pub created: Option<String>,
}

enum Notice {
    Success(&'static str),
    Error(String),
}

/// Handler for the events page: create form plus the caller's events
pub async fn events_page_handler(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Query(params): Query<EventsPageParams>,
) -> Response {
    let Some(session) = session else {
        return signed_out_events_page(&state, StatusCode::OK);
    };

    let notice = params
        .created
        .is_some()
        .then_some(Notice::Success("Projet créé avec succès"));
    let events = events_owned_by(&state, &session.user.provider_id).await;

    Html(events_page(&session.user, notice, None, &events)).into_response()
}

/// Handler for the events page form
///
/// Redirects back to the page on success so a reload does not resubmit.
pub async fn create_event_form_handler(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    form: Result<Form<CreateEventRequest>, FormRejection>,
) -> Response {
    let Some(session) = session else {
        return signed_out_events_page(&state, StatusCode::UNAUTHORIZED);
    };

    let request = match form {
        Ok(Form(request)) => request,
        Err(rejection) => {
            tracing::warn!(error = %rejection, "Unreadable event form");
            CreateEventRequest::default()
        }
    };

    let err = match create_project_for(&state, &session.user, &request).await {
        Ok(_) => return Redirect::to(&format!("{}?created=1", EVENTS_PAGE_PATH)).into_response(),
        Err(err) => err,
    };

    let status = err.status();
    let notice = Notice::Error(error_text(&err));
    if let ApiError::Internal(inner) = &err {
        tracing::error!(error = ?inner, "Event creation failed");
    }
    let events = events_owned_by(&state, &session.user.provider_id).await;

    (
        status,
        Html(events_page(&session.user, Some(notice), Some(&request), &events)),
    )
        .into_response()
}

fn signed_out_events_page(state: &AppState, status: StatusCode) -> Response {
    let body = format!(
        r#"<h1>Créer un projet Dolibarr</h1>
        <p>Connectez-vous pour créer et consulter vos événements.</p>
        <a href="{}/signin?callbackUrl=%2Fdolibarr" class="button">Sign in</a>"#,
        state.config.settings.server.auth_path
    );
    (status, Html(page("Événements", &body))).into_response()
}

fn error_text(err: &ApiError) -> String {
    match err {
        ApiError::InvalidDate(field) => format!("{} ({})", err, field),
        _ => err.to_string(),
    }
}

fn events_page(
    user: &User,
    notice: Option<Notice>,
    values: Option<&CreateEventRequest>,
    events: &Result<Vec<Value>, ApiError>,
) -> String {
    let notice = match notice {
        Some(Notice::Success(text)) => {
            format!(r#"<p class="notice success">{}</p>"#, escape_html(text))
        }
        Some(Notice::Error(text)) => {
            format!(r#"<p class="notice error">{}</p>"#, escape_html(&text))
        }
        None => String::new(),
    };

    let value = |field: Option<&String>| field.map(|v| escape_html(v)).unwrap_or_default();

    let body = format!(
        r#"<h1>Créer un projet Dolibarr</h1>
        <p>{} &middot; Discord ID <code>{}</code></p>
        {}
        <form method="post" action="{}" class="event-form">
            <label>Titre <input type="text" name="label" required value="{}"></label>
            <label>Début <input type="datetime-local" name="datep" required value="{}"></label>
            <label>Fin <input type="datetime-local" name="datef" required value="{}"></label>
            <label>Lieu <input type="text" name="location" value="{}"></label>
            <button type="submit" class="button">Créer le projet</button>
        </form>
        <h2>Mes événements</h2>
        {}"#,
        escape_html(&user.name),
        escape_html(&user.provider_id),
        notice,
        EVENTS_PAGE_PATH,
        value(values.and_then(|r| r.label.as_ref())),
        value(values.and_then(|r| r.datep.as_ref())),
        value(values.and_then(|r| r.datef.as_ref())),
        value(values.and_then(|r| r.location.as_ref())),
        events_html(events),
    );

    page("Événements", &body)
}

fn events_html(events: &Result<Vec<Value>, ApiError>) -> String {
    let events = match events {
        Ok(events) => events,
        Err(err) => {
            return format!(r#"<p class="notice error">{}</p>"#, escape_html(&error_text(err)));
        }
    };
    if events.is_empty() {
        return "<p>Aucun événement trouvé</p>".to_string();
    }

    let items: Vec<String> = events
        .iter()
        .map(|event| {
            let start = json_i64(event.get("datep"))
                .and_then(|secs| DateTime::from_timestamp(secs, 0))
                .map(|date| date.format("%d/%m/%Y %H:%M UTC").to_string())
                .unwrap_or_default();
            format!(
                r#"<li><strong>{}</strong> <span>{}</span> <small>ID: {}</small></li>"#,
                escape_html(&json_text(event.get("label"))),
                start,
                escape_html(&json_text(event.get("id")))
            )
        })
        .collect();

    format!("<ul class=\"events\">\n{}\n</ul>", items.join("\n"))
}

/// Dolibarr returns numbers as either JSON numbers or strings
fn json_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Number(number)) => number.to_string(),
        _ => String::new(),
    }
}

fn json_i64(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn counter_html(counter: Counter) -> String {
    let mut up = counter;
    up.increment();
    let mut down = counter;
    down.decrement();

    format!(
        r#"<div class="counter">
            <a href="/?count={}" class="button">-</a>
            <span>{}</span>
            <a href="/?count={}" class="button">+</a>
        </div>"#,
        down.count(),
        counter.count(),
        up.count()
    )
}

/// Wrap `body` in the shared page layout
pub fn page(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>{}</title>
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, Helvetica, Arial, sans-serif;
            display: flex;
            justify-content: center;
            align-items: center;
            height: 100vh;
            margin: 0;
            background-color: #f5f5f5;
        }}
        .container {{
            text-align: center;
            background: white;
            padding: 40px;
            border-radius: 8px;
            box-shadow: 0 2px 10px rgba(0,0,0,0.1);
        }}
        .button {{
            display: inline-block;
            padding: 12px 24px;
            background-color: #5865f2;
            color: white;
            text-decoration: none;
            border: none;
            border-radius: 4px;
            font-weight: 500;
            cursor: pointer;
        }}
        .button:hover {{
            background-color: #4752c4;
        }}
        .notice.success {{
            color: #10b981;
        }}
        .notice.error {{
            color: #dc2626;
        }}
        .event-form label {{
            display: block;
            margin: 8px 0;
        }}
        .events {{
            text-align: left;
        }}
        .counter {{
            display: flex;
            gap: 16px;
            align-items: center;
            justify-content: center;
            margin-top: 24px;
        }}
    </style>
</head>
<body>
    <div class="container">
        {}
    </div>
</body>
</html>"#,
        escape_html(title),
        body
    )
}

pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user() -> User {
        User::new("Alice <3", "123")
    }

    #[test]
    fn test_events_page_lists_events() {
        let events = Ok(vec![
            json!({"id": "1", "label": "Raid", "datep": 1_704_067_200}),
            json!({"id": 2, "label": "<b>Feast</b>", "datep": "1704070800"}),
        ]);
        let html = events_page(&user(), None, None, &events);

        assert!(html.contains("Alice &lt;3"));
        assert!(html.contains("<code>123</code>"));
        assert!(html.contains("<strong>Raid</strong> <span>01/01/2024 00:00 UTC</span>"));
        assert!(html.contains("&lt;b&gt;Feast&lt;/b&gt;"));
        assert!(html.contains("01/01/2024 01:00 UTC"));
        assert!(html.contains("ID: 2"));
        assert!(html.contains(r#"action="/dolibarr""#));
    }

    #[test]
    fn test_events_page_empty_and_failed() {
        let html = events_page(&user(), None, None, &Ok(Vec::new()));
        assert!(html.contains("Aucun événement trouvé"));

        let html = events_page(&user(), None, None, &Err(ApiError::DolibarrNotConfigured));
        assert!(html.contains("Configuration Dolibarr manquante"));
    }

    #[test]
    fn test_events_page_keeps_form_values_on_error() {
        let request = CreateEventRequest {
            label: Some("Raid \"night\"".to_string()),
            datep: Some("2024-01-01T20:00".to_string()),
            datef: None,
            location: None,
        };
        let notice = Notice::Error(error_text(&ApiError::InvalidDate("datef")));
        let html = events_page(&user(), Some(notice), Some(&request), &Ok(Vec::new()));

        assert!(html.contains(r#"value="Raid &quot;night&quot;""#));
        assert!(html.contains(r#"value="2024-01-01T20:00""#));
        assert!(html.contains("Date invalide (datef)"));
    }

    #[test]
    fn test_counter() {
        let mut counter = Counter::new(0);
        counter.increment();
        counter.increment();
        counter.decrement();
        assert_eq!(counter.count(), 1);

        let mut low = Counter::new(i64::MIN);
        low.decrement();
        assert_eq!(low.count(), i64::MIN);
    }

    #[test]
    fn test_counter_from_query() {
        let params = HomeParams {
            count: Some("41".to_string()),
        };
        assert_eq!(params.counter().count(), 41);

        let params = HomeParams {
            count: Some("lots".to_string()),
        };
        assert_eq!(params.counter().count(), 0);
        assert_eq!(HomeParams::default().counter().count(), 0);
    }

    #[test]
    fn test_counter_links() {
        let html = counter_html(Counter::new(3));
        assert!(html.contains(r#"href="/?count=2""#));
        assert!(html.contains(r#"href="/?count=4""#));
        assert!(html.contains("<span>3</span>"));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<script>alert("x")</script>"#),
            "&lt;script&gt;alert(&quot;x&quot;)&lt;/script&gt;"
        );
        assert_eq!(escape_html("Tom & Jerry"), "Tom &amp; Jerry");
    }
}
