mod common;

use async_trait::async_trait;
use common::*;
use lcp_core::{AuthenticationReason, Authenticator, CancelReason, LcpConfig, LcpError, License};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Hands out scripted answers and records why it was asked
#[derive(Default)]
struct ScriptedAuthenticator {
    answers: Mutex<VecDeque<Option<String>>>,
    reasons: Mutex<Vec<AuthenticationReason>>,
    hints: Mutex<Vec<String>>,
}

impl ScriptedAuthenticator {
    fn new(answers: &[Option<&str>]) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.iter().map(|a| a.map(str::to_string)).collect()),
            ..Default::default()
        })
    }

    fn reasons(&self) -> Vec<AuthenticationReason> {
        self.reasons.lock().unwrap().clone()
    }
}

#[async_trait]
impl Authenticator for ScriptedAuthenticator {
    async fn retrieve_passphrase(
        &self,
        license: &License,
        reason: AuthenticationReason,
        _cancel: &CancellationToken,
    ) -> Option<String> {
        self.reasons.lock().unwrap().push(reason);
        self.hints.lock().unwrap().push(license.text_hint().to_string());
        self.answers.lock().unwrap().pop_front().flatten()
    }
}

/// Never answers
struct SilentAuthenticator;

#[async_trait]
impl Authenticator for SilentAuthenticator {
    async fn retrieve_passphrase(
        &self,
        _license: &License,
        _reason: AuthenticationReason,
        _cancel: &CancellationToken,
    ) -> Option<String> {
        std::future::pending().await
    }
}

fn license() -> (lcp_core::LcpService, License) {
    let service = service(LcpConfig::default());
    let license = service.validate(&license_bytes(LICENSE_ID, PASSPHRASE)).unwrap();
    (service, license)
}

#[tokio::test]
async fn test_prompt_reasons_progress() {
    let (service, license) = license();
    let authenticator = ScriptedAuthenticator::new(&[Some("nope"), Some(PASSPHRASE)]);
    let service = service.with_authenticator(authenticator.clone());

    let context = service.authenticate(&license, None, &CancellationToken::new()).await.unwrap();
    assert_eq!(context.license_id(), LICENSE_ID);
    assert_eq!(
        authenticator.reasons(),
        vec![AuthenticationReason::PassphraseNotFound, AuthenticationReason::InvalidPassphrase]
    );
    assert_eq!(authenticator.hints.lock().unwrap()[0], "a horse, correctly");
}

#[tokio::test]
async fn test_wrong_explicit_passphrase_then_prompt() {
    let (service, license) = license();
    let authenticator = ScriptedAuthenticator::new(&[Some(PASSPHRASE)]);
    let service = service.with_authenticator(authenticator.clone());

    service
        .authenticate(&license, Some("guess"), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(authenticator.reasons(), vec![AuthenticationReason::PassphraseNotFound]);
}

#[tokio::test]
async fn test_dismissed_prompt_is_user_cancel() {
    let (service, license) = license();
    let authenticator = ScriptedAuthenticator::new(&[None]);
    let service = service.with_authenticator(authenticator);

    let result = service.authenticate(&license, None, &CancellationToken::new()).await;
    assert!(matches!(result, Err(LcpError::AuthenticationCancelled(CancelReason::User))));
    assert!(service.cache().is_empty());
}

#[tokio::test]
async fn test_exhausted_prompts() {
    let service = service(LcpConfig::builder().max_prompt_attempts(2).build().unwrap());
    let license = service.validate(&license_bytes(LICENSE_ID, PASSPHRASE)).unwrap();
    let authenticator = ScriptedAuthenticator::new(&[Some("a"), Some("b"), Some(PASSPHRASE)]);
    let service = service.with_authenticator(authenticator.clone());

    let result = service.authenticate(&license, None, &CancellationToken::new()).await;
    assert!(matches!(result, Err(LcpError::WrongPassphrase { .. })));
    assert_eq!(authenticator.reasons().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_signal() {
    let (service, license) = license();
    let service = service.with_authenticator(Arc::new(SilentAuthenticator));
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        trigger.cancel();
    });

    let result = service.authenticate(&license, None, &cancel).await;
    assert!(matches!(result, Err(LcpError::AuthenticationCancelled(CancelReason::Signal))));
}

#[tokio::test]
async fn test_already_cancelled_token() {
    let (service, license) = license();
    let authenticator = ScriptedAuthenticator::new(&[Some(PASSPHRASE)]);
    let service = service.with_authenticator(authenticator.clone());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = service.authenticate(&license, None, &cancel).await;
    assert!(matches!(result, Err(LcpError::AuthenticationCancelled(CancelReason::Signal))));
    assert!(authenticator.reasons().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_prompt_timeout() {
    let service = service(LcpConfig::builder().auth_timeout(Duration::from_secs(30)).build().unwrap());
    let license = service.validate(&license_bytes(LICENSE_ID, PASSPHRASE)).unwrap();
    let service = service.with_authenticator(Arc::new(SilentAuthenticator));

    let result = service.authenticate(&license, None, &CancellationToken::new()).await;
    match result {
        Err(err @ LcpError::AuthenticationCancelled(CancelReason::Timeout)) => assert!(err.is_retryable()),
        Err(other) => panic!("expected timeout, got {other:?}"),
        Ok(_) => panic!("expected timeout"),
    }
}

#[tokio::test]
async fn test_cached_key_reused_until_cleared() {
    let (service, license) = license();
    service
        .authenticate(&license, Some(PASSPHRASE), &CancellationToken::new())
        .await
        .unwrap();
    assert!(service.cache().contains(LICENSE_ID));

    service.authenticate(&license, None, &CancellationToken::new()).await.unwrap();

    service.clear_cache(Some(LICENSE_ID));
    let result = service.authenticate(&license, None, &CancellationToken::new()).await;
    assert!(matches!(result, Err(LcpError::WrongPassphrase { .. })));
}

#[tokio::test]
async fn test_no_candidates_and_no_authenticator() {
    let (service, license) = license();
    let result = service.authenticate(&license, None, &CancellationToken::new()).await;
    match result {
        Err(LcpError::WrongPassphrase { license_id }) => assert_eq!(license_id, LICENSE_ID),
        Err(other) => panic!("expected WrongPassphrase, got {other:?}"),
        Ok(_) => panic!("authentication should fail"),
    }
}

#[tokio::test]
async fn test_same_passphrase_different_license() {
    let (service, _) = license();
    let other = service.validate(&license_bytes("other", PASSPHRASE)).unwrap();
    let context = service
        .authenticate(&other, Some(PASSPHRASE), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(context.license_id(), "other");
}
