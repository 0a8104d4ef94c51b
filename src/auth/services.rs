use time::{Duration, OffsetDateTime};
use tracing::{error, info, warn};

use crate::{
    auth::{
        dto::{SignupRequest, UpdatePasswordRequest},
        jwt::JwtKeys,
        lockout::LockoutPolicy,
        password::{
            check_new_password, hash_password, is_valid_email, normalize_email, verify_password,
        },
        reset::{self, ResetToken},
    },
    error::{AppError, AppResult},
    mail::Email,
    state::AppState,
    users::repo_types::{NewUser, Role, User},
};

/// A user together with a freshly issued session token.
pub type Session = (User, String);

fn issue(state: &AppState, user: User) -> AppResult<Session> {
    let token = JwtKeys::from(&state.config.jwt).sign(user.id)?;
    Ok((user, token))
}

/// Issues the session that follows a password change. Its `iat` lands in
/// the next whole second, strictly after the stored change time.
fn issue_after_change(state: &AppState, user: User, changed: OffsetDateTime) -> AppResult<Session> {
    let token = JwtKeys::from(&state.config.jwt).sign_at(user.id, reissue_time(changed))?;
    Ok((user, token))
}

fn reissue_time(changed: OffsetDateTime) -> OffsetDateTime {
    changed + Duration::seconds(1)
}

/// Stores a new password hash and records the change at `now`.
fn set_password(user: &mut User, plain: &str, now: OffsetDateTime) -> AppResult<()> {
    user.password_hash = hash_password(plain)?;
    user.password_changed_at = Some(now);
    Ok(())
}

pub async fn signup(state: &AppState, req: SignupRequest) -> AppResult<Session> {
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::Validation("Please tell us your name!".into()));
    }
    let email = normalize_email(&req.email);
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(AppError::Validation("Please provide a valid email".into()));
    }
    check_new_password(&req.password, &req.password_confirm)?;

    let user = state
        .users
        .insert(NewUser {
            name,
            email,
            password_hash: hash_password(&req.password)?,
            role: Role::User,
        })
        .await?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    issue(state, user)
}

pub async fn login(state: &AppState, email: &str, password: &str) -> AppResult<Session> {
    let email = normalize_email(email);
    if email.is_empty() || password.is_empty() {
        return Err(AppError::Validation("Please provide email and password!".into()));
    }

    let mut user = state.users.find_by_email(&email).await?.ok_or_else(|| {
        warn!(email = %email, "login unknown email");
        AppError::NotFound("There is no user with that email address".into())
    })?;

    let policy = LockoutPolicy::from(&state.config.security);
    let now = OffsetDateTime::now_utc();
    match policy.admit(&mut user, now) {
        Ok(true) => {
            info!(user_id = %user.id, "lockout expired; attempts reset");
            state.users.save_credentials(&user).await?;
        }
        Ok(false) => {}
        Err(e) => {
            warn!(user_id = %user.id, "login while locked");
            return Err(e);
        }
    }

    if !verify_password(password, &user.password_hash)? {
        let blocked = policy.record_failure(&mut user, now);
        state.users.save_credentials(&user).await?;
        warn!(user_id = %user.id, attempts = user.login_attempts, blocked, "login invalid password");
        if blocked {
            return Err(AppError::Locked {
                minutes: policy.window.whole_minutes(),
                seconds: policy.window.whole_seconds() % 60,
            });
        }
        return Err(AppError::Authentication("Incorrect email or password".into()));
    }

    if policy.record_success(&mut user) {
        state.users.save_credentials(&user).await?;
    }

    info!(user_id = %user.id, email = %user.email, "user logged in");
    issue(state, user)
}

pub async fn forgot_password(state: &AppState, email: &str) -> AppResult<()> {
    let email = normalize_email(email);
    let mut user = state
        .users
        .find_by_email(&email)
        .await?
        .ok_or_else(|| AppError::NotFound("There is no user with that email address".into()))?;

    let ttl = Duration::minutes(state.config.security.reset_token_ttl_minutes);
    let token = ResetToken::generate();
    reset::attach(&mut user, &token, OffsetDateTime::now_utc(), ttl);
    state.users.save_credentials(&user).await?;

    let url = format!(
        "{}/api/v1/users/reset-password/{}",
        state.config.public_url, token.plain
    );
    let mail = Email {
        to: user.email.clone(),
        subject: format!(
            "Your password reset token (valid for {} min)",
            ttl.whole_minutes()
        ),
        text: format!(
            "Forgot your password? Submit a PATCH request with your new password and \
             passwordConfirm to: {url}\nIf you didn't forget your password, please ignore this email!"
        ),
    };

    if let Err(e) = state.mailer.send(mail).await {
        error!(error = %e, user_id = %user.id, "reset mail failed; clearing token");
        reset::clear(&mut user);
        state.users.save_credentials(&user).await?;
        return Err(AppError::Delivery(
            "There was an error sending the email. Try again later!".into(),
        ));
    }

    info!(user_id = %user.id, "password reset token sent");
    Ok(())
}

pub async fn reset_password(
    state: &AppState,
    plain_token: &str,
    password: &str,
    password_confirm: &str,
) -> AppResult<Session> {
    let now = OffsetDateTime::now_utc();
    let mut user = state
        .users
        .find_by_reset_token(&reset::hash_token(plain_token), now)
        .await?
        .ok_or_else(|| AppError::Validation("Token is invalid or has expired".into()))?;

    check_new_password(password, password_confirm)?;
    set_password(&mut user, password, now)?;
    reset::clear(&mut user);
    state.users.save_credentials(&user).await?;

    info!(user_id = %user.id, "password reset");
    issue_after_change(state, user, now)
}

pub async fn update_password(
    state: &AppState,
    mut user: User,
    req: UpdatePasswordRequest,
) -> AppResult<Session> {
    if !verify_password(&req.password_current, &user.password_hash)? {
        warn!(user_id = %user.id, "update password with wrong current password");
        return Err(AppError::Authentication("Your current password is wrong.".into()));
    }
    check_new_password(&req.password, &req.password_confirm)?;
    let now = OffsetDateTime::now_utc();
    set_password(&mut user, &req.password, now)?;
    state.users.save_credentials(&user).await?;

    info!(user_id = %user.id, "password updated");
    issue_after_change(state, user, now)
}
