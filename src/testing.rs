use axum::Router;
use serde_json::{json, Value};

/// Serves `app` on an ephemeral local port and returns its base URL.
pub async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

pub fn bundle_json(id: i64, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "user_id": 1,
        "created_at": "2024-04-01T08:00:00",
        "calc_settings": { "method": "B3LYP", "basis": "6-31G*" }
    })
}

pub fn molecule_json(id: i64, name: &str, bundle_id: i64) -> Value {
    json!({
        "id": id,
        "name": name,
        "charge": 0,
        "multiplicity": 1,
        "structure_xyz": "O 0.000 0.000 0.117\nH 0.000 0.757 -0.467\nH 0.000 -0.757 -0.467",
        "bundle_id": bundle_id,
        "latest_job_id": null
    })
}

pub fn job_json(id: i64, molecule_id: i64, status: &str) -> Value {
    json!({
        "id": id,
        "molecule_id": molecule_id,
        "gjf_path": format!("/data/job{id}.gjf"),
        "log_path": format!("/remote/job{id}.log"),
        "job_type": "SP",
        "status": status,
        "submitted_at": format!("2024-04-0{}T10:00:00", id % 9 + 1),
        "remote_job_id": format!("{id}.pbs"),
        "parent_job_id": null
    })
}
