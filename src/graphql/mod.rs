use std::sync::Arc;

use async_graphql::{
    Context, EmptySubscription, ErrorExtensions, Object, Result, Schema, SimpleObject, Upload,
};

use crate::catalog::Facets;
use crate::service::ImportService;
use crate::session::StatusSnapshot;
use crate::sources::SourceFile;

pub type FolioSchema = Schema<Query, Mutation, EmptySubscription>;

pub fn build_schema(service: Arc<ImportService>) -> FolioSchema {
    Schema::build(Query, Mutation, EmptySubscription)
        .data(service)
        .finish()
}

fn service<'a>(ctx: &Context<'a>) -> Result<&'a Arc<ImportService>> {
    ctx.data::<Arc<ImportService>>()
}

pub struct Query;

#[Object]
impl Query {
    async fn status(&self, ctx: &Context<'_>) -> Result<StatusSnapshot> {
        service(ctx)?.status().await.map_err(|e| e.extend())
    }

    /// Uploaded catalogs, newest first.
    async fn sources(&self, ctx: &Context<'_>) -> Result<Vec<SourceFile>> {
        service(ctx)?.list_sources().await.map_err(|e| e.extend())
    }

    async fn current_source(&self, ctx: &Context<'_>) -> Result<Option<String>> {
        service(ctx)?.current_source().await.map_err(|e| e.extend())
    }

    /// Distinct categories and authors, for building the filter form.
    async fn scan_source(&self, ctx: &Context<'_>, path: Option<String>) -> Result<Facets> {
        service(ctx)?
            .scan_source(path.as_deref())
            .await
            .map_err(|e| e.extend())
    }
}

#[derive(SimpleObject)]
pub struct StartedImport {
    /// Unknown when counting on start is disabled.
    pub total_count: Option<u64>,
    pub status: StatusSnapshot,
}

pub struct Mutation;

#[Object]
impl Mutation {
    async fn upload_source(&self, ctx: &Context<'_>, file: Upload) -> Result<String> {
        let upload = file.value(ctx)?;
        let content = tokio::fs::File::from_std(upload.content);
        let path = service(ctx)?
            .upload_source(upload.content_type.as_deref(), content)
            .await
            .map_err(|e| e.extend())?;
        Ok(path.display().to_string())
    }

    async fn delete_source(&self, ctx: &Context<'_>, path: String) -> Result<String> {
        let deleted = service(ctx)?
            .delete_source(&path)
            .await
            .map_err(|e| e.extend())?;
        Ok(deleted.display().to_string())
    }

    /// Replaces any existing session. `path` defaults to the current source.
    async fn start_import(
        &self,
        ctx: &Context<'_>,
        path: Option<String>,
        categories: Vec<String>,
        #[graphql(default)] authors: Vec<String>,
    ) -> Result<StartedImport> {
        let service = service(ctx)?;
        let total_count = service
            .start_import(path.as_deref(), categories, authors)
            .await
            .map_err(|e| e.extend())?;
        let status = service.status().await.map_err(|e| e.extend())?;
        Ok(StartedImport {
            total_count,
            status,
        })
    }

    /// Runs one step now, for clients that drive the import themselves.
    async fn step_once(&self, ctx: &Context<'_>) -> Result<StatusSnapshot> {
        service(ctx)?.step_once().await.map_err(|e| e.extend())
    }

    async fn stop_import(&self, ctx: &Context<'_>) -> Result<StatusSnapshot> {
        service(ctx)?.stop_import().await.map_err(|e| e.extend())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::session::{ControllerOptions, ManualScheduler, SessionController};
    use crate::settings::Settings;
    use crate::sources::SourceStore;
    use crate::store::SqliteContentStore;
    use serde_json::{json, Value};

    async fn schema(dir: &std::path::Path) -> (FolioSchema, Arc<ImportService>) {
        let pool = test_pool().await;
        let settings = Settings::new(pool.clone());
        let controller = SessionController::new(
            settings.clone(),
            Arc::new(SqliteContentStore::new(pool)),
            Arc::new(ManualScheduler),
            ControllerOptions::default(),
        );
        let sources = SourceStore::open(dir).await.unwrap();
        let service = Arc::new(ImportService::new(controller, settings, sources, None));
        (build_schema(service.clone()), service)
    }

    async fn run(schema: &FolioSchema, query: &str) -> (Value, Vec<async_graphql::ServerError>) {
        let response = schema.execute(query).await;
        (response.data.into_json().unwrap(), response.errors)
    }

    #[tokio::test]
    async fn idle_status_before_any_import() {
        let dir = tempfile::tempdir().unwrap();
        let (schema, _) = schema(dir.path()).await;

        let (data, errors) = run(&schema, "{ status { status processed total percent } }").await;
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(
            data,
            json!({ "status": { "status": "IDLE", "processed": 0, "total": null, "percent": null } })
        );
    }

    #[tokio::test]
    async fn start_import_reports_validation_codes() {
        let dir = tempfile::tempdir().unwrap();
        let (schema, service) = schema(dir.path()).await;
        service
            .upload_source(Some("text/csv"), &b"id;title;d;category\n1;One;;Fiction\n"[..])
            .await
            .unwrap();

        let (_, errors) = run(&schema, r#"mutation { startImport(categories: []) { totalCount } }"#).await;
        let code = errors[0]
            .extensions
            .as_ref()
            .and_then(|extensions| extensions.get("code"))
            .cloned();
        assert_eq!(code, Some(async_graphql::Value::from("NO_GENRE_SELECTED")));

        let (_, errors) = run(
            &schema,
            r#"mutation { startImport(path: "nope.csv", categories: ["Fiction"]) { totalCount } }"#,
        )
        .await;
        let code = errors[0]
            .extensions
            .as_ref()
            .and_then(|extensions| extensions.get("code"))
            .cloned();
        assert_eq!(code, Some(async_graphql::Value::from("SOURCE_NOT_FOUND")));
    }

    #[tokio::test]
    async fn client_driven_import() {
        let dir = tempfile::tempdir().unwrap();
        let (schema, service) = schema(dir.path()).await;
        service
            .upload_source(
                Some("text/csv"),
                &b"id;title;d;category\n1;One;;Fiction\n2;Two;;Poetry\n3;Three;;Fiction\n"[..],
            )
            .await
            .unwrap();

        let (data, errors) = run(
            &schema,
            r#"mutation { startImport(categories: ["Fiction"]) { totalCount status { status } } }"#,
        )
        .await;
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(
            data,
            json!({ "startImport": { "totalCount": 2, "status": { "status": "RUNNING" } } })
        );

        let (data, errors) = run(&schema, "mutation { stepOnce { status processed percent } }").await;
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(
            data,
            json!({ "stepOnce": { "status": "COMPLETED", "processed": 2, "percent": 100.0 } })
        );

        let (data, _) = run(&schema, "{ scanSource { categories authors } }").await;
        assert_eq!(
            data,
            json!({ "scanSource": { "categories": ["Fiction", "Poetry"], "authors": [] } })
        );
    }
}
