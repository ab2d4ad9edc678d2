//! Read-only REST boundary over the run store.
//!
//! One endpoint per child table plus run listing and run-vs-run comparison.
//! The engine never depends on this module; it is a thin JSON view.

use actix_web::{get, web, App, HttpResponse, HttpServer, Responder};
use serde::Deserialize;
use std::path::PathBuf;
use tracing::info;

use crate::error::XraysError;
use crate::store::RunStore;

struct AppState {
    store: RunStore,
}

fn reply<T: serde::Serialize>(result: crate::error::Result<T>) -> HttpResponse {
    match result {
        Ok(value) => HttpResponse::Ok().json(value),
        Err(XraysError::NotFound(id)) => HttpResponse::NotFound().json(serde_json::json!({
            "error": "run not found",
            "run_id": id,
        })),
        Err(e) => HttpResponse::InternalServerError().json(serde_json::json!({
            "error": e.to_string(),
        })),
    }
}

#[get("/api/repos")]
async fn list_repos(state: web::Data<AppState>) -> impl Responder {
    reply(state.store.list_repos())
}

#[derive(Deserialize)]
struct RepoQuery {
    repo: String,
}

#[get("/api/runs")]
async fn list_runs(state: web::Data<AppState>, query: web::Query<RepoQuery>) -> impl Responder {
    reply(state.store.list_runs(&query.repo))
}

#[get("/api/runs/{id}")]
async fn get_run(state: web::Data<AppState>, id: web::Path<String>) -> impl Responder {
    reply(state.store.get_run(&id))
}

#[get("/api/runs/{id}/hotspots")]
async fn get_hotspots(state: web::Data<AppState>, id: web::Path<String>) -> impl Responder {
    reply(exists_then(&state, &id, |s| s.get_hotspot_files(&id)))
}

#[get("/api/runs/{id}/knowledge")]
async fn get_knowledge(state: web::Data<AppState>, id: web::Path<String>) -> impl Responder {
    reply(exists_then(&state, &id, |s| s.get_knowledge_files(&id)))
}

#[get("/api/runs/{id}/coupling")]
async fn get_coupling(state: web::Data<AppState>, id: web::Path<String>) -> impl Responder {
    reply(exists_then(&state, &id, |s| s.get_coupling_pairs(&id)))
}

#[get("/api/runs/{id}/pain")]
async fn get_pain(state: web::Data<AppState>, id: web::Path<String>) -> impl Responder {
    reply(exists_then(&state, &id, |s| s.get_file_pain(&id)))
}

#[get("/api/runs/{id}/anemic")]
async fn get_anemic(state: web::Data<AppState>, id: web::Path<String>) -> impl Responder {
    reply(exists_then(&state, &id, |s| s.get_anemic_classes(&id)))
}

#[get("/api/runs/{id}/complexity")]
async fn get_complexity(state: web::Data<AppState>, id: web::Path<String>) -> impl Responder {
    reply(exists_then(&state, &id, |s| s.get_complexity_functions(&id)))
}

#[get("/api/runs/{id}/god-classes")]
async fn get_god_classes(state: web::Data<AppState>, id: web::Path<String>) -> impl Responder {
    reply(exists_then(&state, &id, |s| s.get_god_classes(&id)))
}

#[get("/api/runs/{id}/clusters")]
async fn get_clusters(state: web::Data<AppState>, id: web::Path<String>) -> impl Responder {
    reply(exists_then(&state, &id, |s| s.get_cluster_summaries(&id)))
}

#[get("/api/runs/{id}/drift")]
async fn get_drift(state: web::Data<AppState>, id: web::Path<String>) -> impl Responder {
    reply(exists_then(&state, &id, |s| s.get_cluster_drift(&id)))
}

#[get("/api/runs/{id}/effort")]
async fn get_effort(state: web::Data<AppState>, id: web::Path<String>) -> impl Responder {
    reply(exists_then(&state, &id, |s| s.get_effort_files(&id)))
}

#[get("/api/runs/{id}/cognitive")]
async fn get_cognitive(state: web::Data<AppState>, id: web::Path<String>) -> impl Responder {
    reply(exists_then(&state, &id, |s| s.get_dx_cognitive_files(&id)))
}

#[derive(Deserialize)]
struct CompareQuery {
    a: String,
    b: String,
}

#[get("/api/compare")]
async fn compare(state: web::Data<AppState>, query: web::Query<CompareQuery>) -> impl Responder {
    reply(state.store.compare(&query.a, &query.b))
}

/// Child lookups 404 on an unknown run id instead of returning empty rows.
fn exists_then<T>(
    state: &web::Data<AppState>,
    run_id: &str,
    fetch: impl FnOnce(&RunStore) -> crate::error::Result<Vec<T>>,
) -> crate::error::Result<Vec<T>> {
    state.store.get_run(run_id)?;
    fetch(&state.store)
}

/// Serve the REST API; blocks until shutdown.
pub fn run_server(db_path: PathBuf, port: u16) -> anyhow::Result<()> {
    let store = RunStore::open(&db_path)?;
    let state = web::Data::new(AppState { store });
    info!(%port, db = %db_path.display(), "serving REST API");

    actix_web::rt::System::new().block_on(async move {
        HttpServer::new(move || {
            App::new()
                .app_data(state.clone())
                .service(list_repos)
                .service(list_runs)
                .service(get_run)
                .service(get_hotspots)
                .service(get_knowledge)
                .service(get_coupling)
                .service(get_pain)
                .service(get_anemic)
                .service(get_complexity)
                .service(get_god_classes)
                .service(get_clusters)
                .service(get_drift)
                .service(get_effort)
                .service(get_cognitive)
                .service(compare)
        })
        .bind(("127.0.0.1", port))?
        .run()
        .await
    })?;
    Ok(())
}
