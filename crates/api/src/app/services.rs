use std::sync::Arc;

use anyhow::Context;

use warden_auth::{
    ANY_ROLE, AuthorizationEngine, Hs256TokenService, RoleRecord, RouteKey, TracingAuditSink,
};
use warden_core::{SetOp, SubjectId};
use warden_infra::{DocumentStore, InMemoryDocumentStore, PermissionStore, RegistryError};
#[cfg(feature = "postgres")]
use warden_infra::PostgresDocumentStore;

use crate::config::{AppConfig, Persistence};

pub const ADMIN_ROLE: &str = "admin";

/// Route templates of the administrative surface, as matched by the router.
pub const ADMIN_ROUTES: [&str; 4] = ["/schema", "/acm", "/role", "/role/:name"];

const ADMIN_METHODS: [&str; 4] = ["GET", "POST", "PUT", "DELETE"];

/// Shared handles used by every handler.
#[derive(Clone)]
pub struct AppServices {
    pub permissions: PermissionStore,
    pub tokens: Arc<Hs256TokenService>,
    pub engine: AuthorizationEngine,
}

pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let store = open_store(&config.persistence).await?;

    let permissions = PermissionStore::new(store);
    permissions
        .init()
        .await
        .context("failed to initialise permission collections")?;

    if let Some(subject) = &config.admin_subject {
        seed_admin(&permissions, subject)
            .await
            .context("failed to seed admin role")?;
    }

    let tokens = Arc::new(Hs256TokenService::new(
        config.jwt_secret.as_bytes(),
        config.token_ttl,
    ));
    let engine = AuthorizationEngine::new(
        tokens.clone(),
        Arc::new(permissions.clone()),
        Arc::new(TracingAuditSink),
    );

    Ok(AppServices {
        permissions,
        tokens,
        engine,
    })
}

async fn open_store(persistence: &Persistence) -> anyhow::Result<Arc<dyn DocumentStore>> {
    match persistence {
        Persistence::InMemory => Ok(Arc::new(InMemoryDocumentStore::new())),
        Persistence::Postgres { database_url } => {
            #[cfg(feature = "postgres")]
            {
                let store = PostgresDocumentStore::connect(database_url)
                    .await
                    .context("failed to connect to Postgres")?;
                tracing::info!("using postgres document store");
                Ok(Arc::new(store))
            }
            #[cfg(not(feature = "postgres"))]
            {
                let _ = database_url;
                tracing::warn!(
                    "USE_PERSISTENT_STORES=true but postgres feature not enabled, falling back to in-memory"
                );
                Ok(Arc::new(InMemoryDocumentStore::new()))
            }
        }
    }
}

/// Create the `admin` role over the administrative routes and add `subject` to it.
async fn seed_admin(permissions: &PermissionStore, subject: &str) -> Result<(), RegistryError> {
    let subject = SubjectId::new(subject)?;
    if subject.as_str() == ANY_ROLE {
        return Err(RegistryError::validation("the admin subject cannot be 'any'"));
    }

    let mut routes = Vec::new();
    for route in ADMIN_ROUTES {
        for method in ADMIN_METHODS {
            routes.push(RouteKey::new(route, method)?);
        }
    }

    match permissions
        .roles
        .create(RoleRecord::new(ADMIN_ROLE, "administrative routes"))
        .await
    {
        Ok(_) | Err(RegistryError::Conflict(_)) => {}
        Err(e) => return Err(e),
    }
    permissions
        .roles
        .mutate_routes(ADMIN_ROLE, SetOp::Push, &routes)
        .await?;
    permissions
        .roles
        .mutate_members(ADMIN_ROLE, SetOp::Push, std::slice::from_ref(&subject))
        .await?;

    tracing::info!(subject = %subject, "seeded '{ADMIN_ROLE}' role");
    Ok(())
}
