//! 探针

use axum::{Json, extract::State};
use serde_json::{Value, json};

use crate::state::AppState;

const SERVICE_NAME: &str = "economy-api";

/// 存活探针
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": SERVICE_NAME
    }))
}

/// 就绪探针：内存装配时没有数据库，直接视为就绪
pub async fn readiness_check(State(state): State<AppState>) -> Json<Value> {
    let (db_ok, pool) = match &state.database {
        Some(db) => (db.health_check().await.is_ok(), json!(db.stats())),
        None => (true, Value::Null),
    };

    Json(json!({
        "status": if db_ok { "ok" } else { "degraded" },
        "service": SERVICE_NAME,
        "checks": {
            "database": if db_ok { "ok" } else { "fail" },
            "pool": pool
        }
    }))
}
