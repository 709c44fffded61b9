//! Session lifetime management.
//!
//! BambooHR has no token endpoint; a session is whatever falls out of the
//! web login flow. Logging in is a strict sequence: form POST to `login.php`
//! (which yields the CSRF token inside a script tag), a trusted-device POST
//! if this client has no valid marker cookie, then a GET of the home page to
//! scrape the profile and time-tracking metadata, and finally a session-check
//! to learn how long the session lives. Each step depends on the cookies and
//! token of the previous one, so the whole pipeline is awaited in order.

use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, StatusCode};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::BambooError;
use crate::helpers::request::{self, ApiRequest, ApiResponse, CookieStore};
use crate::helpers::{catalog, scrape};
use crate::models::bamboo::{CatalogEntry, CheckSessionResponse, SessionUser, TimeTrackingMeta};

const CSRF_TOKEN_MARKER: &str = "CSRF_TOKEN = \"";
const SESSION_USER_MARKER: &str = "SESSION_USER=";
const TIME_TRACKING_MARKER: &str = "window.time_tracking = ";

const LOGIN_ENDPOINT: &str = "login.php";
const TRUSTED_DEVICE_ENDPOINT: &str = "auth/trusted_browser";
const HOME_ENDPOINT: &str = "home";
const CHECK_SESSION_ENDPOINT: &str = "auth/check_session?isOnboarding=false";

/// Cookie the platform uses to remember that this client already passed the
/// secondary device challenge.
const TRUSTED_DEVICE_COOKIE: &str = "tbx";

/// Where the platform should land us after the login form.
const LOGIN_REDIRECT: &str = "/home";

/// Username and secret for one host, as handed out by the external store.
#[derive(Debug, Clone)]
pub struct Credential {
    pub username: String,
    pub secret: String,
}

/// External credential lookup, keyed by host. Opaque to the core; a `None`
/// is fatal and surfaces before any network traffic.
pub trait CredentialProvider: Send + Sync {
    fn lookup(&self, host: &str) -> Option<Credential>;
}

/// CSRF token plus the instant it stops being honored.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub csrf_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Everything one successful login produces. Replaced wholesale by the next
/// login; the catalog is derived from `meta` at the same moment.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub state: SessionState,
    pub user: SessionUser,
    pub meta: TimeTrackingMeta,
    pub catalog: BTreeMap<String, CatalogEntry>,
}

/// Owns the auth state for one BambooHR organization and runs the login /
/// renewal choreography. Only this type ever writes the session; everything
/// else reads snapshots.
pub struct SessionManager {
    client: Client,
    base_url: String,
    host: String,
    timezone: String,
    cookies: CookieStore,
    credentials: Arc<dyn CredentialProvider>,
    session: Option<SessionContext>,
}

impl SessionManager {
    /// Manager for `https://<organization>.bamboohr.com`.
    pub fn new(
        organization: &str,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, BambooError> {
        Self::with_base_url(format!("https://{organization}.bamboohr.com"), credentials)
    }

    /// Manager against an explicit base URL (tests, proxies).
    pub fn with_base_url(
        base_url: impl Into<String>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, BambooError> {
        let base_url = base_url.into();
        let host = host_of(&base_url);
        let client = Client::builder().build()?;
        info!("Created session manager for {}", host);
        Ok(Self {
            client,
            base_url,
            host,
            timezone: "UTC".to_string(),
            cookies: CookieStore::default(),
            credentials,
            session: None,
        })
    }

    /// Timezone label sent with the login form.
    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Current session, if any. No validity check; see [`Self::ensure_session`].
    pub fn session(&self) -> Option<&SessionContext> {
        self.session.as_ref()
    }

    /// Guarantee a present, unexpired session on return, logging in if there
    /// is none or it has lapsed. Callers invoke this right before every
    /// session-dependent request; the returned snapshot must not be assumed
    /// valid across await points.
    pub async fn ensure_session(&mut self) -> Result<&SessionContext, BambooError> {
        let valid = self
            .session
            .as_ref()
            .is_some_and(|session| Utc::now() < session.state.expires_at);
        if !valid {
            self.login().await?;
        }
        self.session.as_ref().ok_or(BambooError::Unauthorized)
    }

    /// Run the full login sequence, replacing any previous session.
    pub async fn login(&mut self) -> Result<(), BambooError> {
        let Some(credential) = self.credentials.lookup(&self.host) else {
            error!("No credential available for host {}", self.host);
            return Err(BambooError::MissingCredential(self.host.clone()));
        };

        info!("Logging in to {} as {}", self.host, credential.username);
        self.session = None;

        let form = vec![
            ("tz".to_string(), self.timezone.clone()),
            ("r".to_string(), LOGIN_REDIRECT.to_string()),
            ("username".to_string(), credential.username),
            ("password".to_string(), credential.secret),
            ("login".to_string(), "Log in".to_string()),
            ("CSRFToken".to_string(), String::new()),
        ];
        let response = self
            .send(ApiRequest::post(LOGIN_ENDPOINT).form(form), None)
            .await?
            .error_for_status(LOGIN_ENDPOINT)?;
        let csrf_token = scrape::find_balanced_value(CSRF_TOKEN_MARKER, &response.body)?.to_string();

        if !self.trusted_device_valid() {
            info!("Trusted-device marker absent or expired, marking this client trusted");
            self.send(ApiRequest::post(TRUSTED_DEVICE_ENDPOINT), Some(&csrf_token))
                .await?
                .error_for_status(TRUSTED_DEVICE_ENDPOINT)?;
        }

        let home = self
            .send(ApiRequest::get(HOME_ENDPOINT), Some(&csrf_token))
            .await?
            .error_for_status(HOME_ENDPOINT)?;
        let user: SessionUser = scrape::find_json(SESSION_USER_MARKER, &home.body)?;
        let meta: TimeTrackingMeta = scrape::find_json(TIME_TRACKING_MARKER, &home.body)?;
        info!("Logged in as {} (employee {})", user.name, user.employee_id);

        // The login pages never say how long the session lives; ask the
        // session-check endpoint, whose token also supersedes the scraped one.
        let check = self
            .send(
                ApiRequest::get(CHECK_SESSION_ENDPOINT).accept_json(),
                Some(&csrf_token),
            )
            .await?
            .error_for_status(CHECK_SESSION_ENDPOINT)?;
        let renewed: CheckSessionResponse = check.json()?;

        let catalog = catalog::flatten(&meta);
        self.session = Some(SessionContext {
            state: SessionState {
                csrf_token: renewed.csrf_token,
                expires_at: Utc::now() + Duration::minutes(renewed.session_minutes_left),
            },
            user,
            meta,
            catalog,
        });
        Ok(())
    }

    /// Renew the current session in place. An unauthorized answer gets one
    /// re-login; any other failure surfaces.
    pub async fn check_session(&mut self) -> Result<(), BambooError> {
        if self.session.is_none() {
            return self.login().await;
        }

        let csrf_token = self.csrf_token();
        let response = self
            .send(
                ApiRequest::get(CHECK_SESSION_ENDPOINT).accept_json(),
                csrf_token.as_deref(),
            )
            .await?;
        if response.status == StatusCode::UNAUTHORIZED {
            warn!("Session check came back unauthorized, logging in again");
            return self.login().await;
        }

        let renewed: CheckSessionResponse =
            response.error_for_status(CHECK_SESSION_ENDPOINT)?.json()?;
        info!("Session renewed, {} minute(s) left", renewed.session_minutes_left);
        if let Some(session) = &mut self.session {
            session.state.csrf_token = renewed.csrf_token;
            session.state.expires_at =
                Utc::now() + Duration::minutes(renewed.session_minutes_left);
        }
        Ok(())
    }

    /// Send a request under the current session state.
    pub async fn execute(&mut self, request: ApiRequest) -> Result<ApiResponse, BambooError> {
        let csrf_token = self.csrf_token();
        self.send(request, csrf_token.as_deref()).await
    }

    fn csrf_token(&self) -> Option<String> {
        self.session
            .as_ref()
            .map(|session| session.state.csrf_token.clone())
    }

    async fn send(
        &mut self,
        request: ApiRequest,
        csrf_token: Option<&str>,
    ) -> Result<ApiResponse, BambooError> {
        request::execute(
            &self.client,
            &self.base_url,
            &self.host,
            &mut self.cookies,
            csrf_token,
            request,
        )
        .await
    }

    fn trusted_device_valid(&self) -> bool {
        self.cookies
            .get_for_host(&self.host, TRUSTED_DEVICE_COOKIE)
            .is_some_and(|cookie| !cookie.is_expired(Utc::now()))
    }
}

fn host_of(base_url: &str) -> String {
    let rest = base_url
        .split_once("://")
        .map_or(base_url, |(_, rest)| rest);
    let rest = rest.split(['/', '?']).next().unwrap_or(rest);
    rest.split(':').next().unwrap_or(rest).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::request::Cookie;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct StaticCredentials;

    impl CredentialProvider for StaticCredentials {
        fn lookup(&self, _host: &str) -> Option<Credential> {
            Some(Credential { username: "ada".into(), secret: "hunter2".into() })
        }
    }

    struct NoCredentials;

    impl CredentialProvider for NoCredentials {
        fn lookup(&self, _host: &str) -> Option<Credential> {
            None
        }
    }

    const LOGIN_BODY: &str = r#"<script>var CSRF_TOKEN = "scraped-token";</script>"#;
    const HOME_BODY: &str = concat!(
        r#"<html><script>SESSION_USER={"employeeId":42,"name":"Ada"};"#,
        r#"window.time_tracking = {"timesheetId":7,"projectsWithTasks":"#,
        r#"[{"id":1,"name":"Ops","tasks":[]}]};</script></html>"#
    );

    async fn mount_login_flow(server: &MockServer, expected_logins: u64) {
        Mock::given(method("POST"))
            .and(path("/login.php"))
            .and(body_string_contains("username=ada"))
            .and(body_string_contains("password=hunter2"))
            .and(body_string_contains("CSRFToken="))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(LOGIN_BODY)
                    .insert_header("Set-Cookie", "PHPSESSID=sess1; Path=/"),
            )
            .expect(expected_logins)
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/trusted_browser"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Set-Cookie", "tbx=trusted; Max-Age=86400"),
            )
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/home"))
            .respond_with(ResponseTemplate::new(200).set_body_string(HOME_BODY))
            .mount(server)
            .await;
    }

    async fn mount_check_session(server: &MockServer, times: u64) {
        Mock::given(method("GET"))
            .and(path("/auth/check_session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "SessionMinutesLeft": 30,
                "CSRFToken": "fresh-token"
            })))
            .up_to_n_times(times)
            .mount(server)
            .await;
    }

    fn manager(server: &MockServer) -> SessionManager {
        SessionManager::with_base_url(server.uri(), Arc::new(StaticCredentials)).unwrap()
    }

    #[tokio::test]
    async fn login_scrapes_profile_and_metadata() {
        let server = MockServer::start().await;
        mount_login_flow(&server, 1).await;
        mount_check_session(&server, u64::MAX).await;

        let mut manager = manager(&server);
        let context = manager.ensure_session().await.unwrap();

        assert_eq!(context.user.employee_id, 42);
        assert_eq!(context.user.name, "Ada");
        assert_eq!(context.meta.timesheet_id, 7);
        assert!(context.catalog.contains_key("Ops"));
        // The session-check token supersedes the scraped one.
        assert_eq!(context.state.csrf_token, "fresh-token");
        assert!(context.state.expires_at > Utc::now());

        // The home request rode on the session cookie from login.
        let requests = server.received_requests().await.unwrap();
        let home = requests.iter().find(|r| r.url.path() == "/home").unwrap();
        let cookie = home.headers.get("cookie").unwrap().to_str().unwrap();
        assert!(cookie.contains("PHPSESSID=sess1"));
    }

    #[tokio::test]
    async fn ensure_session_twice_logs_in_once() {
        let server = MockServer::start().await;
        mount_login_flow(&server, 1).await;
        mount_check_session(&server, u64::MAX).await;

        let mut manager = manager(&server);
        manager.ensure_session().await.unwrap();
        manager.ensure_session().await.unwrap();
    }

    #[tokio::test]
    async fn expired_session_triggers_exactly_one_login() {
        let server = MockServer::start().await;
        mount_login_flow(&server, 2).await;
        mount_check_session(&server, u64::MAX).await;

        let mut manager = manager(&server);
        manager.ensure_session().await.unwrap();

        if let Some(session) = &mut manager.session {
            session.state.expires_at = Utc::now() - Duration::minutes(1);
        }
        manager.ensure_session().await.unwrap();
    }

    #[tokio::test]
    async fn missing_credential_fails_before_any_network_call() {
        let server = MockServer::start().await;
        let mut manager =
            SessionManager::with_base_url(server.uri(), Arc::new(NoCredentials)).unwrap();

        let err = manager.ensure_session().await.unwrap_err();
        assert!(matches!(err, BambooError::MissingCredential(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unauthorized_check_triggers_single_relogin() {
        let server = MockServer::start().await;
        mount_login_flow(&server, 2).await;
        mount_check_session(&server, 1).await;

        let mut manager = manager(&server);
        manager.ensure_session().await.unwrap();

        // The next session check is rejected once; the one after (inside the
        // re-login) succeeds again.
        Mock::given(method("GET"))
            .and(path("/auth/check_session"))
            .respond_with(ResponseTemplate::new(401))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        mount_check_session(&server, u64::MAX).await;

        manager.check_session().await.unwrap();
        let context = manager.session().unwrap();
        assert_eq!(context.state.csrf_token, "fresh-token");
        assert!(Utc::now() < context.state.expires_at);
    }

    #[tokio::test]
    async fn valid_trusted_device_cookie_skips_marking() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/login.php"))
            .respond_with(ResponseTemplate::new(200).set_body_string(LOGIN_BODY))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/trusted_browser"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/home"))
            .respond_with(ResponseTemplate::new(200).set_body_string(HOME_BODY))
            .mount(&server)
            .await;
        mount_check_session(&server, u64::MAX).await;

        let mut manager = manager(&server);
        let host = manager.host.clone();
        manager.cookies.set(
            &host,
            "tbx",
            Cookie { value: "trusted".into(), expires: Some(Utc::now() + Duration::days(1)) },
        );
        manager.ensure_session().await.unwrap();
    }

    #[test]
    fn host_extraction_handles_ports_and_paths() {
        assert_eq!(host_of("https://acme.bamboohr.com"), "acme.bamboohr.com");
        assert_eq!(host_of("http://127.0.0.1:4545/"), "127.0.0.1");
    }
}
