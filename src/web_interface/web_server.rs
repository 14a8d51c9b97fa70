use std::net::SocketAddr;

use crate::configuration::WebSettings;
use crate::engine::EngineHandle;
use crate::error_handling::types::WebError;
use crate::web_interface::types::{IngestResponse, MonitorResponse, SessionResponse};
use log::info;
use uuid::Uuid;

use warp::{http::StatusCode, reply, Filter, Rejection, Reply};

/// API error payload
#[derive(serde::Serialize)]
struct ApiError {
    message: String,
}

/// JSON API server over the capture engine.
///
/// Read endpoints serve the latest published snapshot; write endpoints issue
/// consumer commands (toggle, reset) or feed events into the ingest queue.
pub struct WebServer {
    handle: EngineHandle,
}

impl WebServer {
    pub fn new(handle: EngineHandle) -> Self {
        Self { handle }
    }

    /// Start the web server with the given settings.
    pub async fn start(&self, settings: &WebSettings) -> Result<(), WebError> {
        let addr: SocketAddr = format!("{}:{}", settings.bind_address, settings.port)
            .parse()
            .map_err(|_| {
                WebError::BadAddress(format!("{}:{}", settings.bind_address, settings.port))
            })?;

        let routes = self.routes();
        info!("web interface listening on {}", addr);
        warp::serve(routes).run(addr).await;
        Ok(())
    }

    fn routes(&self) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
        let handle = self.handle.clone();
        let handle_for_session = handle.clone();
        let handle_for_toggle = handle.clone();
        let handle_for_reset = handle.clone();
        let handle_for_stats = handle.clone();
        let handle_for_events = handle.clone();

        // GET / -> stub index
        let index = warp::path::end().and(warp::get()).and_then(|| async move {
            let html = r#"<html><head><title>netlens</title></head>
                <body><h1>netlens is capturing</h1><p>See /sessions for JSON.</p></body></html>"#;
            Ok::<_, Rejection>(reply::html(html))
        });

        // GET /sessions -> full monitor view
        let list_sessions = warp::path("sessions")
            .and(warp::path::end())
            .and(warp::get())
            .and_then(move || {
                let handle = handle.clone();
                async move {
                    let view = handle.snapshot();
                    Ok::<_, Rejection>(reply::with_status(
                        reply::json(&MonitorResponse::from(view.as_ref())),
                        StatusCode::OK,
                    ))
                }
            });

        // GET /sessions/:id -> one session
        let get_session = warp::path!("sessions" / String)
            .and(warp::get())
            .and_then(move |id_str: String| {
                let handle = handle_for_session.clone();
                async move {
                    let id = match Uuid::parse_str(&id_str) {
                        Ok(u) => u,
                        Err(_) => {
                            let res = reply::with_status(
                                reply::json(&ApiError {
                                    message: "Invalid session id".to_string(),
                                }),
                                StatusCode::BAD_REQUEST,
                            )
                            .into_response();
                            return Ok::<_, Rejection>(res);
                        }
                    };

                    let view = handle.snapshot();
                    match view.session(id) {
                        Some(session) => {
                            let res = reply::with_status(
                                reply::json(&SessionResponse::from(session)),
                                StatusCode::OK,
                            )
                            .into_response();
                            Ok::<_, Rejection>(res)
                        }
                        None => {
                            let res = reply::with_status(
                                reply::json(&ApiError {
                                    message: "Session not found".to_string(),
                                }),
                                StatusCode::NOT_FOUND,
                            )
                            .into_response();
                            Ok::<_, Rejection>(res)
                        }
                    }
                }
            });

        // POST /sessions/:id/toggle -> flip expand state
        let toggle_session = warp::path!("sessions" / String / "toggle")
            .and(warp::post())
            .and_then(move |id_str: String| {
                let handle = handle_for_toggle.clone();
                async move {
                    let id = match Uuid::parse_str(&id_str) {
                        Ok(u) => u,
                        Err(_) => {
                            let res = reply::with_status(
                                reply::json(&ApiError {
                                    message: "Invalid session id".to_string(),
                                }),
                                StatusCode::BAD_REQUEST,
                            )
                            .into_response();
                            return Ok::<_, Rejection>(res);
                        }
                    };

                    if handle.toggle_open(id) {
                        let res = reply::with_status(
                            reply::json(&serde_json::json!({ "toggled": true })),
                            StatusCode::OK,
                        )
                        .into_response();
                        Ok::<_, Rejection>(res)
                    } else {
                        let res = reply::with_status(
                            reply::json(&ApiError {
                                message: "Session not found".to_string(),
                            }),
                            StatusCode::NOT_FOUND,
                        )
                        .into_response();
                        Ok::<_, Rejection>(res)
                    }
                }
            });

        // POST /reset -> discard all capture state
        let reset = warp::path("reset")
            .and(warp::path::end())
            .and(warp::post())
            .and_then(move || {
                let handle = handle_for_reset.clone();
                async move {
                    handle.reset();
                    Ok::<_, Rejection>(reply::with_status(
                        reply::json(&serde_json::json!({ "reset": true })),
                        StatusCode::OK,
                    ))
                }
            });

        // GET /stats -> health counters
        let stats = warp::path("stats")
            .and(warp::path::end())
            .and(warp::get())
            .and_then(move || {
                let handle = handle_for_stats.clone();
                async move {
                    let view = handle.snapshot();
                    Ok::<_, Rejection>(reply::with_status(
                        reply::json(&view.stats),
                        StatusCode::OK,
                    ))
                }
            });

        // POST /events -> ingest one wire event or an array of them
        let ingest_events = warp::path("events")
            .and(warp::path::end())
            .and(warp::post())
            .and(warp::body::json())
            .and_then(move |body: serde_json::Value| {
                let handle = handle_for_events.clone();
                async move {
                    let events = match body {
                        serde_json::Value::Array(events) => events,
                        single => vec![single],
                    };
                    let mut accepted = 0;
                    let mut rejected = 0;
                    for event in events {
                        if handle.ingest_value(event) {
                            accepted += 1;
                        } else {
                            rejected += 1;
                        }
                    }
                    Ok::<_, Rejection>(reply::with_status(
                        reply::json(&IngestResponse { accepted, rejected }),
                        StatusCode::OK,
                    ))
                }
            });

        index
            .or(list_sessions)
            .or(get_session)
            .or(toggle_session)
            .or(reset)
            .or(stats)
            .or(ingest_events)
    }
}
