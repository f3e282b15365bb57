use std::sync::Arc;

use alloy::primitives::Bytes;
use async_trait::async_trait;
use tokio::sync::Mutex;
use wallet_aa_core::userop::{SponsorshipPolicy, UserOpPipeline};
use wallet_core::account::Account;
use wallet_core::error::WalletError;
use wallet_core::transaction::Call;

use super::{CallsPrompt, Decision, DecisionSurface};
use crate::internal::Internal;

/// Carries an approved call batch from confirmation to submission. The
/// production implementation runs the full user-operation pipeline; tests
/// swap in a scripted one.
#[async_trait]
pub trait CallExecutor: Send + Sync {
    async fn execute(
        &self,
        internal: &Arc<Internal>,
        account: &Account,
        calls: &[Call],
        sponsorship: &SponsorshipPolicy,
        surface: &dyn DecisionSurface,
        prompt: CallsPrompt,
    ) -> Result<Bytes, WalletError>;
}

pub struct UserOpExecutor;

#[async_trait]
impl CallExecutor for UserOpExecutor {
    /// Prepare the operation, keep the quote fresh while the confirmation
    /// surface is open, then sign and submit the latest copy on approval.
    async fn execute(
        &self,
        internal: &Arc<Internal>,
        account: &Account,
        calls: &[Call],
        sponsorship: &SponsorshipPolicy,
        surface: &dyn DecisionSurface,
        prompt: CallsPrompt,
    ) -> Result<Bytes, WalletError> {
        let chain = internal.active_chain()?;
        let pipeline = Arc::new(UserOpPipeline::new(internal.authenticator.clone()));

        let prepared = pipeline
            .prepare(&chain, account, calls, sponsorship)
            .await?;
        let latest = Arc::new(Mutex::new(prepared));

        // Gas and sponsorship quotes age while the user deliberates; only
        // the most recently prepared copy may be signed.
        let refresh = tokio::spawn({
            let pipeline = pipeline.clone();
            let latest = latest.clone();
            let chain = chain.clone();
            let account = account.clone();
            let calls = calls.to_vec();
            let sponsorship = sponsorship.clone();
            let interval = internal.refresh_interval;
            async move {
                loop {
                    tokio::time::sleep(interval).await;
                    match pipeline.prepare(&chain, &account, &calls, &sponsorship).await {
                        Ok(prepared) => {
                            tracing::debug!(
                                generation = prepared.generation(),
                                "refreshed prepared user operation"
                            );
                            *latest.lock().await = prepared;
                        }
                        Err(err) => {
                            tracing::debug!(error = %err, "userop refresh failed");
                        }
                    }
                }
            }
        });

        let decision = surface.confirm_calls(prompt).await;
        refresh.abort();

        if decision != Decision::Approve {
            return Err(WalletError::user_rejected());
        }

        let key = account
            .key
            .as_ref()
            .ok_or_else(|| WalletError::Unauthorized {
                address: account.address.to_string(),
            })?;

        let prepared = latest.lock().await.clone();
        let signed = pipeline.sign(prepared, key).await?;

        // Re-resolve the active chain at send time: switching chains while
        // the confirmation surface was open must not submit elsewhere.
        let send_chain = internal.active_chain()?;
        pipeline.send(&send_chain, signed).await
    }
}
