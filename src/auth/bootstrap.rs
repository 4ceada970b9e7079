use crate::{
    auth::types::{ApprovalStatus, Role},
    config::AuthConfig,
    services::{ServiceContext, user_service::UserCandidate},
};

/// Creates the configured admin account if it does not exist yet.
pub async fn seed_admin(cfg: &AuthConfig, services: &ServiceContext) -> anyhow::Result<()> {
    let Some(admin) = cfg.admin.as_ref() else {
        return Ok(());
    };

    let users = services.user();
    if users.find_by_user_id(&admin.user_id).await?.is_some() {
        tracing::info!(user_id = %admin.user_id, "admin user already present");
        return Ok(());
    }

    let user = users
        .create_user(
            UserCandidate {
                user_id: admin.user_id.clone(),
                name: admin.name.clone(),
                phone: admin.phone.clone(),
                password: admin.password.clone(),
                email: None,
            },
            Role::Admin,
            ApprovalStatus::Approved,
        )
        .await?;
    tracing::info!(user_id = %user.user_id, "seeded admin user");
    Ok(())
}
