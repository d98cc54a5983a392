//! Enrollment sinks: the Moodle web-service client and a log-only stand-in
//! for dry runs.

use std::{convert::Infallible, time::Duration};

use anyhow::{Context as _, bail};
use reqwest::Client;
use rollcall_core::{batch::BatchAssignment, reconcile::EnrollmentSink};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
  config::MoodleSettings,
  error::{Result, SinkError},
};

/// Async client for the Moodle REST web-service endpoint.
///
/// Clones share the inner [`reqwest::Client`].
#[derive(Clone)]
pub struct MoodleSink {
  client:   Client,
  settings: MoodleSettings,
}

impl MoodleSink {
  pub fn new(settings: MoodleSettings) -> anyhow::Result<Self> {
    if settings.base_url.is_empty() || settings.token.is_empty() {
      bail!("moodle.base_url and moodle.token must be configured");
    }
    let client = Client::builder()
      .timeout(Duration::from_secs(settings.timeout_secs))
      .build()
      .context("failed to build HTTP client")?;
    Ok(Self { client, settings })
  }

  fn endpoint(&self) -> String {
    format!(
      "{}/webservice/rest/server.php",
      self.settings.base_url.trim_end_matches('/')
    )
  }

  /// Invoke `function` with form-encoded `params`.
  async fn call(&self, function: &str, params: &[(String, String)]) -> Result<Value> {
    let resp = self
      .client
      .post(self.endpoint())
      .query(&[
        ("wstoken", self.settings.token.as_str()),
        ("wsfunction", function),
        ("moodlewsrestformat", "json"),
      ])
      .form(params)
      .send()
      .await?;

    if !resp.status().is_success() {
      return Err(SinkError::Status(resp.status()));
    }
    // Some functions answer with an empty body on success.
    let text = resp.text().await?;
    let body = if text.trim().is_empty() {
      Value::Null
    } else {
      serde_json::from_str(&text).map_err(|e| SinkError::Response(e.to_string()))?
    };
    check_exception(body)
  }

  // ── Users ─────────────────────────────────────────────────────────────────

  /// `core_user_get_users_by_field` on `username`.
  async fn user_id(&self, username: &str) -> Result<Option<i64>> {
    let body = self
      .call(
        "core_user_get_users_by_field",
        &[
          ("field".into(), "username".into()),
          ("values[0]".into(), username.to_owned()),
        ],
      )
      .await?;
    Ok(first_id(&body))
  }

  /// `core_user_create_users`; returns the new user's id.
  async fn create_user(&self, assignment: &BatchAssignment) -> Result<i64> {
    let params = user_params(assignment);
    check_required(&params)?;
    let body = self.call("core_user_create_users", &params).await?;
    first_id(&body).ok_or_else(|| SinkError::Response(format!("no user id in {body}")))
  }

  // ── Enrolment & groups ────────────────────────────────────────────────────

  async fn enrol(&self, user_id: i64) -> Result<()> {
    self
      .call(
        "enrol_manual_enrol_users",
        &[
          ("enrolments[0][roleid]".into(), self.settings.role_id.to_string()),
          ("enrolments[0][userid]".into(), user_id.to_string()),
          ("enrolments[0][courseid]".into(), self.settings.course_id.to_string()),
          ("enrolments[0][suspend]".into(), "0".into()),
        ],
      )
      .await?;
    Ok(())
  }

  async fn group_id(&self, name: &str) -> Result<Option<i64>> {
    let body = self
      .call(
        "core_group_get_course_groups",
        &[("courseid".into(), self.settings.course_id.to_string())],
      )
      .await?;
    Ok(find_group(&body, name))
  }

  async fn add_to_group(&self, user_id: i64, group_id: i64) -> Result<()> {
    self
      .call(
        "core_group_add_group_members",
        &[
          ("members[0][userid]".into(), user_id.to_string()),
          ("members[0][groupid]".into(), group_id.to_string()),
        ],
      )
      .await?;
    Ok(())
  }
}

impl EnrollmentSink for MoodleSink {
  type Error = SinkError;

  async fn enroll(&self, assignment: &BatchAssignment) -> Result<()> {
    let identity = assignment.record.id_number.as_str();

    let user_id = match self.user_id(identity).await? {
      Some(id) => {
        debug!(%identity, user_id = id, "user already exists");
        id
      }
      None => self.create_user(assignment).await?,
    };
    self.enrol(user_id).await?;

    let group = assignment.record.group.trim();
    if !group.is_empty() {
      let Some(group_id) = self.group_id(group).await? else {
        warn!(%identity, %group, "group not found in course");
        return Err(SinkError::GroupNotFound(group.to_owned()));
      };
      self.add_to_group(user_id, group_id).await?;
    }
    Ok(())
  }

  async fn is_enrolled(&self, identity: &str) -> Result<bool> {
    let Some(user_id) = self.user_id(identity).await? else {
      return Ok(false);
    };
    let courses = self
      .call(
        "core_enrol_get_users_courses",
        &[("userid".into(), user_id.to_string())],
      )
      .await?;
    Ok(lists_course(&courses, self.settings.course_id))
  }
}

// ─── Dry run ─────────────────────────────────────────────────────────────────

/// Logs what would be enrolled and succeeds without calling out.
pub struct DryRunSink;

impl EnrollmentSink for DryRunSink {
  type Error = Infallible;

  async fn enroll(&self, assignment: &BatchAssignment) -> Result<(), Infallible> {
    info!(
      identity = %assignment.record.id_number,
      batch = %assignment.batch,
      group = %assignment.record.group,
      "dry run: would enroll"
    );
    Ok(())
  }

  async fn is_enrolled(&self, _: &str) -> Result<bool, Infallible> { Ok(false) }
}

// ─── Payload helpers ─────────────────────────────────────────────────────────

/// Turn a Moodle `exception` payload into an error.
fn check_exception(body: Value) -> Result<Value> {
  match body.get("exception").and_then(Value::as_str) {
    Some(exception) => Err(SinkError::Moodle {
      exception: exception.to_owned(),
      message:   body
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned(),
    }),
    None => Ok(body),
  }
}

/// Form parameters for `core_user_create_users`. Username and password are
/// both the identity.
fn user_params(assignment: &BatchAssignment) -> Vec<(String, String)> {
  let r = &assignment.record;
  let mut params: Vec<(String, String)> = vec![
    ("users[0][username]".into(), r.id_number.clone()),
    ("users[0][password]".into(), r.id_number.clone()),
    ("users[0][firstname]".into(), r.first_name.trim().to_owned()),
    ("users[0][lastname]".into(), r.last_name.trim().to_owned()),
    ("users[0][email]".into(), r.email.trim().to_owned()),
    ("users[0][auth]".into(), "manual".into()),
    ("users[0][idnumber]".into(), r.id_number.clone()),
    ("users[0][phone1]".into(), r.phone.trim().to_owned()),
  ];

  let custom = [
    ("modalidad", r.delivery_mode.trim()),
    ("departamento", r.region.trim()),
    ("municipio", r.city.as_deref().unwrap_or_default().trim()),
    ("lote", assignment.batch.profile_value()),
  ];
  let present = custom.into_iter().filter(|(_, v)| !v.is_empty());
  for (i, (field, value)) in present.enumerate() {
    params.push((format!("users[0][customfields][{i}][type]"), field.to_owned()));
    params.push((format!("users[0][customfields][{i}][value]"), value.to_owned()));
  }
  params
}

/// Account fields `core_user_create_users` must receive non-blank.
const REQUIRED_USER_FIELDS: [&str; 7] =
  ["username", "password", "firstname", "lastname", "email", "idnumber", "phone1"];

fn check_required(params: &[(String, String)]) -> Result<()> {
  for field in REQUIRED_USER_FIELDS {
    let key = format!("users[0][{field}]");
    let present = params.iter().any(|(k, v)| *k == key && !v.trim().is_empty());
    if !present {
      return Err(SinkError::MissingField(field));
    }
  }
  Ok(())
}

/// `id` of the first object in a list response.
fn first_id(body: &Value) -> Option<i64> {
  body.as_array()?.first()?.get("id")?.as_i64()
}

fn find_group(body: &Value, name: &str) -> Option<i64> {
  body
    .as_array()?
    .iter()
    .find(|g| g.get("name").and_then(Value::as_str) == Some(name))?
    .get("id")?
    .as_i64()
}

fn lists_course(body: &Value, course_id: i64) -> bool {
  body
    .as_array()
    .is_some_and(|courses| courses.iter().any(|c| c.get("id").and_then(Value::as_i64) == Some(course_id)))
}

#[cfg(test)]
mod tests {
  use rollcall_core::{batch::assign, record::RosterRecord};
  use serde_json::json;

  use super::*;

  fn assignment() -> BatchAssignment {
    let mut first = RosterRecord::new("1001", "VIRTUAL", "CALDAS");
    first.first_name = " Ana ".into();
    first.last_name = "Ríos".into();
    let mut second = RosterRecord::new("1002", "PRESENCIAL", "CHOCÓ");
    second.city = Some("Quibdó".into());
    assign(vec![first, second]).remove(1)
  }

  fn complete(id: &str, group: &str) -> BatchAssignment {
    let mut r = RosterRecord::new(id, "VIRTUAL", "CALDAS");
    r.first_name = "Ana".into();
    r.last_name = "Ríos".into();
    r.email = "ana@example.com".into();
    r.phone = "3001234567".into();
    r.group = group.into();
    assign(vec![r]).remove(0)
  }

  fn param<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
  }

  #[test]
  fn user_params_carry_identity_and_profile_fields() {
    let params = user_params(&assignment());

    assert_eq!(param(&params, "users[0][username]"), Some("1002"));
    assert_eq!(param(&params, "users[0][password]"), Some("1002"));
    assert_eq!(param(&params, "users[0][auth]"), Some("manual"));
    assert_eq!(param(&params, "users[0][customfields][0][type]"), Some("modalidad"));
    assert_eq!(param(&params, "users[0][customfields][1][value]"), Some("CHOCÓ"));
    assert_eq!(param(&params, "users[0][customfields][2][value]"), Some("Quibdó"));
    assert_eq!(param(&params, "users[0][customfields][3][type]"), Some("lote"));
    assert_eq!(param(&params, "users[0][customfields][3][value]"), Some("Lote 2"));
  }

  #[test]
  fn empty_custom_fields_are_skipped() {
    let mut a = assignment();
    a.record.city = None;
    let params = user_params(&a);
    assert_eq!(param(&params, "users[0][customfields][2][type]"), Some("lote"));
  }

  #[test]
  fn exception_payload_is_an_error() {
    let err = check_exception(json!({
      "exception": "invalid_parameter_exception",
      "message": "Invalid parameter value detected"
    }))
    .unwrap_err();
    assert_eq!(
      err.to_string(),
      "invalid_parameter_exception: Invalid parameter value detected"
    );
    assert!(check_exception(json!([{"id": 1}])).is_ok());
    assert!(check_exception(Value::Null).is_ok());
  }

  #[test]
  fn response_helpers() {
    assert_eq!(first_id(&json!([{"id": 77, "username": "1001"}])), Some(77));
    assert_eq!(first_id(&json!([])), None);

    let groups = json!([{"id": 3, "name": "Programacion"}, {"id": 4, "name": "Blockchain"}]);
    assert_eq!(find_group(&groups, "Blockchain"), Some(4));
    assert_eq!(find_group(&groups, "Robótica"), None);

    assert!(lists_course(&json!([{"id": 2}, {"id": 5}]), 5));
    assert!(!lists_course(&json!([{"id": 2}]), 5));
  }

  #[test]
  fn sink_requires_endpoint_and_token() {
    assert!(MoodleSink::new(MoodleSettings::default()).is_err());
  }

  #[test]
  fn required_fields_are_checked_before_create() {
    assert!(check_required(&user_params(&complete("1001", ""))).is_ok());

    let mut a = complete("1001", "");
    a.record.email = "  ".into();
    assert!(matches!(
      check_required(&user_params(&a)),
      Err(SinkError::MissingField("email"))
    ));

    // Names, email and phone are all blank; the first in order is named.
    let err = check_required(&user_params(&assignment())).unwrap_err();
    assert_eq!(err.to_string(), "required field missing: firstname");
  }

  // ── Against a fake Moodle ───────────────────────────────────────────────

  mod server {
    use std::{
      collections::HashMap,
      sync::{Arc, Mutex},
    };

    use axum::{
      Form, Json, Router,
      extract::{Query, State},
      routing::post,
    };
    use serde_json::{Value, json};

    pub const COURSE: i64 = 5;

    /// A Moodle that knows some users, enrolments and course groups, and
    /// remembers every web-service function it was asked to run.
    #[derive(Default)]
    pub struct FakeMoodle {
      pub users:    Mutex<HashMap<String, i64>>,
      pub enrolled: Mutex<Vec<i64>>,
      pub groups:   Value,
      pub calls:    Mutex<Vec<String>>,
    }

    impl FakeMoodle {
      pub fn calls(&self) -> Vec<String> { self.calls.lock().unwrap().clone() }
    }

    fn param<'a>(form: &'a [(String, String)], key: &str) -> &'a str {
      form
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
        .unwrap_or_default()
    }

    async fn rest(
      State(moodle): State<Arc<FakeMoodle>>,
      Query(query): Query<HashMap<String, String>>,
      Form(form): Form<Vec<(String, String)>>,
    ) -> Json<Value> {
      let function = query.get("wsfunction").cloned().unwrap_or_default();
      moodle.calls.lock().unwrap().push(function.clone());
      if query.get("wstoken").map(String::as_str) != Some("secret") {
        return Json(json!({"exception": "moodle_exception", "message": "Invalid token"}));
      }

      Json(match function.as_str() {
        "core_user_get_users_by_field" => {
          let users = moodle.users.lock().unwrap();
          match users.get(param(&form, "values[0]")) {
            Some(id) => json!([{ "id": id }]),
            None => json!([]),
          }
        }
        "core_user_create_users" => {
          let mut users = moodle.users.lock().unwrap();
          let id = 100 + users.len() as i64;
          users.insert(param(&form, "users[0][username]").to_owned(), id);
          json!([{ "id": id }])
        }
        "enrol_manual_enrol_users" => {
          let user: i64 = param(&form, "enrolments[0][userid]").parse().unwrap();
          moodle.enrolled.lock().unwrap().push(user);
          Value::Null
        }
        "core_group_get_course_groups" => moodle.groups.clone(),
        "core_group_add_group_members" => Value::Null,
        "core_enrol_get_users_courses" => {
          let user: i64 = param(&form, "userid").parse().unwrap();
          if moodle.enrolled.lock().unwrap().contains(&user) {
            json!([{ "id": COURSE }])
          } else {
            json!([])
          }
        }
        other => json!({"exception": "invalid_function", "message": other}),
      })
    }

    /// Serve `moodle` on a random local port; returns its base URL.
    pub async fn spawn(moodle: Arc<FakeMoodle>) -> String {
      let app = Router::new()
        .route("/webservice/rest/server.php", post(rest))
        .with_state(moodle);
      let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
      let addr = listener.local_addr().unwrap();
      tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
      format!("http://{addr}")
    }
  }

  use std::sync::Arc;

  use server::{COURSE, FakeMoodle};

  async fn sink_for(moodle: Arc<FakeMoodle>) -> MoodleSink {
    let base_url = server::spawn(moodle).await;
    MoodleSink::new(MoodleSettings {
      base_url,
      token: "secret".into(),
      course_id: COURSE,
      timeout_secs: 5,
      ..MoodleSettings::default()
    })
    .unwrap()
  }

  fn groups() -> Value { json!([{"id": 3, "name": "Blockchain"}]) }

  #[tokio::test]
  async fn enroll_creates_user_enrols_and_joins_group() {
    let moodle = Arc::new(FakeMoodle { groups: groups(), ..Default::default() });
    let sink = sink_for(moodle.clone()).await;

    sink.enroll(&complete("1001", "Blockchain")).await.unwrap();

    assert_eq!(moodle.calls(), [
      "core_user_get_users_by_field",
      "core_user_create_users",
      "enrol_manual_enrol_users",
      "core_group_get_course_groups",
      "core_group_add_group_members",
    ]);
    assert!(sink.is_enrolled("1001").await.unwrap());
    assert!(!sink.is_enrolled("2002").await.unwrap());
  }

  #[tokio::test]
  async fn enroll_reuses_existing_user() {
    let moodle = Arc::new(FakeMoodle { groups: groups(), ..Default::default() });
    moodle.users.lock().unwrap().insert("1001".into(), 42);
    let sink = sink_for(moodle.clone()).await;

    sink.enroll(&complete("1001", "")).await.unwrap();

    assert_eq!(moodle.calls(), ["core_user_get_users_by_field", "enrol_manual_enrol_users"]);
    assert_eq!(*moodle.enrolled.lock().unwrap(), [42]);
  }

  #[tokio::test]
  async fn unknown_group_fails_the_enrollment() {
    let moodle = Arc::new(FakeMoodle { groups: groups(), ..Default::default() });
    let sink = sink_for(moodle.clone()).await;

    let err = sink.enroll(&complete("1001", "Programacion")).await.unwrap_err();

    assert!(matches!(&err, SinkError::GroupNotFound(g) if g == "Programacion"));
    assert!(!moodle.calls().contains(&"core_group_add_group_members".to_string()));
  }

  #[tokio::test]
  async fn incomplete_record_is_not_created() {
    let moodle = Arc::new(FakeMoodle::default());
    let sink = sink_for(moodle.clone()).await;
    let mut a = complete("1001", "");
    a.record.phone = String::new();

    let err = sink.enroll(&a).await.unwrap_err();

    assert!(matches!(err, SinkError::MissingField("phone1")));
    assert_eq!(moodle.calls(), ["core_user_get_users_by_field"]);
    assert!(moodle.users.lock().unwrap().is_empty());
  }

  #[tokio::test]
  async fn exception_payload_fails_the_call() {
    let moodle = Arc::new(FakeMoodle::default());
    let base_url = server::spawn(moodle).await;
    let sink = MoodleSink::new(MoodleSettings {
      base_url,
      token: "wrong".into(),
      ..MoodleSettings::default()
    })
    .unwrap();

    let err = sink.is_enrolled("1001").await.unwrap_err();
    assert_eq!(err.to_string(), "moodle_exception: Invalid token");
  }
}
