/// Profile completion: promote a token-bound anonymous visitor into a full
/// user record.
use super::{AccessService, ProfileInput};
use crate::{
    db::models::{DeviceSession, User},
    error::{GateError, GateResult},
    store::NewUser,
    validation,
};

impl AccessService {
    /// Complete a profile against a redeemed token. The device session is
    /// created or revived from the IP/fingerprint already bound to the
    /// token, never re-derived from the current request, so the binding
    /// established at redemption carries through unchanged.
    pub async fn complete_profile(
        &self,
        input: &ProfileInput,
        user_agent: &str,
    ) -> GateResult<(User, DeviceSession)> {
        let name = validation::require_field(&input.name, "name")?;
        let city = validation::require_field(&input.city, "city")?;
        let email = validation::require_field(&input.email, "email")?.to_lowercase();
        validation::validate_email(&email)?;
        let phone = validation::require_field(&input.phone, "phone")?;
        let phone = validation::normalize_phone(phone, &self.config.access.default_country_code)?;

        let token = self
            .tokens
            .get_by_id(input.token_id)
            .await?
            .ok_or_else(|| GateError::NotFound(format!("Token {} not found", input.token_id)))?;

        let (Some(bound_ip), Some(bound_fingerprint)) =
            (token.ip_address.clone(), token.device_fingerprint.clone())
        else {
            return Err(GateError::Validation(
                "Token has not been redeemed yet".to_string(),
            ));
        };

        // Find by email first; fall back to the phone handle for legacy
        // records that predate email capture.
        let existing = match self.users.get_by_email(&email).await? {
            Some(user) => Some(user),
            None => self.users.get_by_phone(&phone).await?,
        };

        let user = match existing {
            Some(user) => {
                self.users
                    .update_profile(user.id, name, &phone, city, &email)
                    .await?;
                self.users
                    .get_by_id(user.id)
                    .await?
                    .ok_or_else(|| GateError::Internal("User vanished during update".to_string()))?
            }
            None => {
                let user = self
                    .users
                    .create(NewUser {
                        name: name.to_string(),
                        whatsapp_number: phone.clone(),
                        email: Some(email.clone()),
                        city: Some(city.to_string()),
                        is_admin: false,
                        is_primary_admin: false,
                        profile_completed: true,
                    })
                    .await?;
                tracing::info!("Created user {} via profile completion", user.id);
                user
            }
        };

        if token.user_id != Some(user.id) {
            self.tokens.link_to_user(token.id, user.id).await?;
        }

        // Reuse the device session for this binding when one exists,
        // reviving it if it was deactivated; otherwise create it.
        let session = match self
            .devices
            .get_by_fingerprint(&bound_fingerprint, &bound_ip, false)
            .await?
        {
            Some(session) if session.user_id == user.id => {
                self.devices.reactivate(session.id).await?;
                self.devices
                    .get_by_fingerprint(&bound_fingerprint, &bound_ip, true)
                    .await?
                    .unwrap_or(session)
            }
            _ => {
                self.devices
                    .create(
                        user.id,
                        Some(token.id),
                        &bound_ip,
                        &bound_fingerprint,
                        user_agent,
                    )
                    .await?
            }
        };

        Ok((user, session))
    }
}
