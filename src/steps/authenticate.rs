//! Authenticate-Push Step
//!
//! Runs once per push and feeds every uploader. Probes the registry for a
//! `WWW-Authenticate` challenge, then either exchanges credentials for a
//! Bearer token scoped `repository:<repo>:push,pull` or passes Basic
//! credentials through. A registry with no challenge is anonymous: the
//! step resolves to `None` and no request carries an Authorization header.

use crate::events::{LogLevel, Timer};
use crate::image::ImageReference;
use crate::registry::{push_scope, retry_transient, AuthChallenge, Authorization, RegistryError};
use crate::steps::{PushContext, Step};
use std::sync::Arc;

pub(crate) fn spawn(ctx: &Arc<PushContext>, target: ImageReference) -> Step<Option<Authorization>> {
    let cancel = ctx.cancel.clone();
    let ctx = Arc::clone(ctx);

    Step::spawn(&cancel, async move {
        let _timer = Timer::start(
            ctx.events.clone(),
            format!("authenticating push to {}", target.registry),
        );

        let challenge = retry_transient(
            || ctx.registry.auth_challenge(&target),
            "authentication probe",
        )
        .await?;

        let authorization = match challenge {
            None => {
                ctx.log(
                    LogLevel::Debug,
                    format!(
                        "{} advertises no auth challenge, pushing anonymously",
                        target.registry
                    ),
                );
                None
            }
            Some(challenge) => {
                let scope = push_scope(&target.repository);
                let credentials = ctx.credentials.lookup(&target.registry);

                // Basic cannot be satisfied without credentials; Bearer
                // realms may still issue anonymous tokens.
                if credentials.is_none() && challenge == AuthChallenge::Basic {
                    return Err(RegistryError::AuthRequired {
                        registry: target.registry.clone(),
                        scope,
                    }
                    .into());
                }

                let authorization = retry_transient(
                    || {
                        ctx.registry
                            .fetch_token(&target, &challenge, &scope, credentials.as_ref())
                    },
                    "token exchange",
                )
                .await?;

                ctx.log(
                    LogLevel::Debug,
                    format!("authenticated against {} for {}", target.registry, scope),
                );
                Some(authorization)
            }
        };

        Ok(authorization)
    })
}
