//! Action engine: drives a user action from intent to on-chain confirmation.
//!
//! Every transactional action runs the same pipeline: validate
//! preconditions, upload content when the action carries any, request typed
//! data, sign, then submit through the relayer with a direct hub write as
//! the fallback. Progress surfaces through an event handler; the terminal
//! state is the returned receipt or error.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use alloy_primitives::{address, Address};
use tracing::{debug, info, warn};

use marbel_content::{gateway_uri, ContentStore, IpfsClient};
use marbel_indexer::{
    BroadcastOutcome, CollectModuleParams, CreateCommentRequest, CreateMirrorRequest,
    CreatePostRequest, CreateProfileRequest, IndexerApi, IndexerClient, ReferenceModuleParams,
    RELAY_NOT_ALLOWED,
};
use marbel_metadata::page::default_avatar;
use marbel_metadata::{
    comment_metadata, normalize_handle, post_metadata, validate_handle, validate_publication,
    MediaItem, PublicationMetadata,
};
use marbel_session::{Session, SessionProfile};
use marbel_signing::{
    CommentWithSigData, Eip712Signature, MirrorWithSigData, PostWithSigData, TypedDataEnvelope,
};
use marbel_types::{Hex, MarbelError, Result};
use marbel_wallet::{HubCall, WalletAdapter};

/// Protocol deployment parameters. Defaults target the Mumbai testnet
/// deployment.
#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    pub chain_id: u64,
    pub hub_address: Address,
    pub api_url: String,
    pub ipfs_api_url: String,
    pub ipfs_gateway: String,
    pub relay_on: bool,
    pub app_id: String,
    pub request_timeout_ms: u64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            chain_id: 80001,
            hub_address: address!("60Ae865ee4C725cd04353b5AAb364553f56ceF82"),
            api_url: "https://api-mumbai.lens.dev".into(),
            ipfs_api_url: "https://ipfs.infura.io:5001".into(),
            ipfs_gateway: "https://ipfs.infura.io".into(),
            relay_on: true,
            app_id: "Marbel".into(),
            request_timeout_ms: 30_000,
        }
    }
}

/// The user actions the engine can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Comment,
    Post,
    Mirror,
    CreateProfile,
    Login,
}

impl ActionKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Comment => "comment",
            Self::Post => "post",
            Self::Mirror => "mirror",
            Self::CreateProfile => "create-profile",
            Self::Login => "login",
        }
    }
}

/// Pipeline step, reported through the event handler as a run progresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStage {
    Validating,
    UploadingContent,
    RequestingTypedData,
    AwaitingSignature,
    Broadcasting,
    FallbackWriting,
}

/// Which path submitted the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionRoute {
    Relay,
    Direct,
}

/// Terminal record of a confirmed action.
#[derive(Debug, Clone)]
pub struct ActionReceipt {
    pub kind: ActionKind,
    pub tx_hash: Hex,
    pub route: SubmissionRoute,
}

/// Action progress event.
#[derive(Debug, Clone)]
pub enum ActionEvent {
    Started {
        kind: ActionKind,
    },
    Stage {
        kind: ActionKind,
        stage: ActionStage,
    },
    Confirmed {
        kind: ActionKind,
        tx_hash: Hex,
        route: SubmissionRoute,
    },
    Failed {
        kind: ActionKind,
        message: String,
    },
}

/// Callback type for action events.
pub type ActionEventHandler = Box<dyn Fn(ActionEvent) + Send + Sync>;

/// Compose-form state for a comment or post. The engine clears it after a
/// confirmed submission and keeps it on failure so nothing typed is lost.
#[derive(Debug, Clone, Default)]
pub struct PublicationDraft {
    pub content: String,
    pub attachments: Vec<MediaItem>,
    pub collect_module: CollectModuleParams,
    pub follower_only_reference: bool,
}

impl PublicationDraft {
    /// A text-only draft with default modules.
    pub fn text(content: &str) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// The action engine orchestrates publication, profile and auth flows
/// against one protocol deployment.
pub struct ActionEngine {
    config: ProtocolConfig,
    indexer: Arc<dyn IndexerApi>,
    content: Arc<dyn ContentStore>,
    wallet: Arc<dyn WalletAdapter>,
    on_event: Option<ActionEventHandler>,
    in_flight: Mutex<HashSet<ActionKind>>,
}

/// Releases the single-flight slot when a run ends, on any path.
struct FlightGuard<'a> {
    engine: &'a ActionEngine,
    kind: ActionKind,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.engine.in_flight.lock().unwrap().remove(&self.kind);
    }
}

impl ActionEngine {
    pub fn new(
        config: ProtocolConfig,
        indexer: Arc<dyn IndexerApi>,
        content: Arc<dyn ContentStore>,
        wallet: Arc<dyn WalletAdapter>,
        on_event: Option<ActionEventHandler>,
    ) -> Self {
        Self {
            config,
            indexer,
            content,
            wallet,
            on_event,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Engine wired to the HTTP indexer and IPFS clients named in `config`.
    pub fn with_http_clients(
        config: ProtocolConfig,
        wallet: Arc<dyn WalletAdapter>,
        on_event: Option<ActionEventHandler>,
    ) -> Self {
        let indexer = Arc::new(IndexerClient::new(
            &config.api_url,
            Some(config.request_timeout_ms),
        ));
        let content = Arc::new(IpfsClient::new(
            &config.ipfs_api_url,
            Some(config.request_timeout_ms),
        ));
        Self::new(config, indexer, content, wallet, on_event)
    }

    fn emit(&self, event: ActionEvent) {
        if let Some(ref handler) = self.on_event {
            handler(event);
        }
    }

    fn stage(&self, kind: ActionKind, stage: ActionStage) {
        debug!(action = kind.name(), stage = ?stage, "stage");
        self.emit(ActionEvent::Stage { kind, stage });
    }

    /// Claim the single-flight slot for `kind` or refuse the run.
    fn begin(&self, kind: ActionKind) -> Result<FlightGuard<'_>> {
        if !self.in_flight.lock().unwrap().insert(kind) {
            return Err(MarbelError::ActionInFlight(kind.name()));
        }
        Ok(FlightGuard { engine: self, kind })
    }

    fn finish(&self, kind: ActionKind, result: Result<ActionReceipt>) -> Result<ActionReceipt> {
        match result {
            Ok(receipt) => {
                info!(
                    action = kind.name(),
                    tx_hash = %receipt.tx_hash,
                    route = ?receipt.route,
                    "action confirmed"
                );
                self.emit(ActionEvent::Confirmed {
                    kind,
                    tx_hash: receipt.tx_hash.clone(),
                    route: receipt.route,
                });
                Ok(receipt)
            }
            Err(e) => {
                debug!(action = kind.name(), error = %e, "action failed");
                self.emit(ActionEvent::Failed {
                    kind,
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Comment on a publication. The draft is cleared on confirmation.
    pub async fn comment(
        &self,
        author: &SessionProfile,
        publication_id: &str,
        draft: &mut PublicationDraft,
    ) -> Result<ActionReceipt> {
        let kind = ActionKind::Comment;
        let _guard = self.begin(kind)?;
        self.emit(ActionEvent::Started { kind });
        let result = self.run_comment(author, publication_id, draft).await;
        self.finish(kind, result)
    }

    /// Publish a top-level post. The draft is cleared on confirmation.
    pub async fn post(
        &self,
        author: &SessionProfile,
        draft: &mut PublicationDraft,
    ) -> Result<ActionReceipt> {
        let kind = ActionKind::Post;
        let _guard = self.begin(kind)?;
        self.emit(ActionEvent::Started { kind });
        let result = self.run_post(author, draft).await;
        self.finish(kind, result)
    }

    /// Mirror a publication into the author's own feed.
    pub async fn mirror(
        &self,
        author: &SessionProfile,
        publication_id: &str,
    ) -> Result<ActionReceipt> {
        let kind = ActionKind::Mirror;
        let _guard = self.begin(kind)?;
        self.emit(ActionEvent::Started { kind });
        let result = self.run_mirror(author, publication_id).await;
        self.finish(kind, result)
    }

    /// Register a new handle through the relayer. A rejection reason is
    /// terminal; profile creation has no direct-write fallback.
    pub async fn create_profile(
        &self,
        handle: &str,
        picture_uri: Option<String>,
    ) -> Result<ActionReceipt> {
        let kind = ActionKind::CreateProfile;
        let _guard = self.begin(kind)?;
        self.emit(ActionEvent::Started { kind });
        let result = self.run_create_profile(handle, picture_uri).await;
        self.finish(kind, result)
    }

    /// Authenticate the connected wallet and adopt its profiles into the
    /// session: challenge, plain-message signature, token exchange.
    pub async fn login(&self, session: &mut Session) -> Result<()> {
        let kind = ActionKind::Login;
        let _guard = self.begin(kind)?;
        self.emit(ActionEvent::Started { kind });
        let result = self.run_login(session).await;
        if let Err(ref e) = result {
            debug!(action = kind.name(), error = %e, "action failed");
            self.emit(ActionEvent::Failed {
                kind,
                message: e.to_string(),
            });
        }
        result
    }

    /// Drop the API token and clear the persisted session.
    pub async fn logout(&self, session: &mut Session) -> Result<()> {
        self.indexer.set_access_token(None);
        session.logout().await
    }

    async fn run_comment(
        &self,
        author: &SessionProfile,
        publication_id: &str,
        draft: &mut PublicationDraft,
    ) -> Result<ActionReceipt> {
        let kind = ActionKind::Comment;
        self.stage(kind, ActionStage::Validating);
        self.require_wallet()?;
        self.require_chain()?;
        validate_publication(&draft.content, &draft.attachments)?;

        let metadata = comment_metadata(
            &draft.content,
            &draft.attachments,
            &author.handle,
            &self.config.app_id,
        );
        let content_uri = self.upload_metadata(kind, &metadata).await?;

        self.stage(kind, ActionStage::RequestingTypedData);
        let request = CreateCommentRequest {
            profile_id: author.id.clone(),
            publication_id: publication_id.into(),
            content_uri,
            collect_module: draft.collect_module.clone(),
            reference_module: ReferenceModuleParams {
                follower_only_reference_module: draft.follower_only_reference,
            },
        };
        let envelope = self.indexer.create_comment_typed_data(&request).await?;

        let (signature, sig) = self.sign_envelope(kind, &envelope).await?;
        let call = HubCall::CommentWithSig(CommentWithSigData::from_envelope(&envelope, sig)?);
        let receipt = self
            .relay_or_write(kind, &envelope.id, &signature, call)
            .await?;
        draft.reset();
        Ok(receipt)
    }

    async fn run_post(
        &self,
        author: &SessionProfile,
        draft: &mut PublicationDraft,
    ) -> Result<ActionReceipt> {
        let kind = ActionKind::Post;
        self.stage(kind, ActionStage::Validating);
        self.require_wallet()?;
        self.require_chain()?;
        validate_publication(&draft.content, &draft.attachments)?;

        let metadata = post_metadata(
            &draft.content,
            &draft.attachments,
            &author.handle,
            &self.config.app_id,
        );
        let content_uri = self.upload_metadata(kind, &metadata).await?;

        self.stage(kind, ActionStage::RequestingTypedData);
        let request = CreatePostRequest {
            profile_id: author.id.clone(),
            content_uri,
            collect_module: draft.collect_module.clone(),
            reference_module: ReferenceModuleParams {
                follower_only_reference_module: draft.follower_only_reference,
            },
        };
        let envelope = self.indexer.create_post_typed_data(&request).await?;

        let (signature, sig) = self.sign_envelope(kind, &envelope).await?;
        let call = HubCall::PostWithSig(PostWithSigData::from_envelope(&envelope, sig)?);
        let receipt = self
            .relay_or_write(kind, &envelope.id, &signature, call)
            .await?;
        draft.reset();
        Ok(receipt)
    }

    async fn run_mirror(
        &self,
        author: &SessionProfile,
        publication_id: &str,
    ) -> Result<ActionReceipt> {
        let kind = ActionKind::Mirror;
        self.stage(kind, ActionStage::Validating);
        self.require_wallet()?;
        self.require_chain()?;

        self.stage(kind, ActionStage::RequestingTypedData);
        let request = CreateMirrorRequest {
            profile_id: author.id.clone(),
            publication_id: publication_id.into(),
            reference_module: ReferenceModuleParams::default(),
        };
        let envelope = self.indexer.create_mirror_typed_data(&request).await?;

        let (signature, sig) = self.sign_envelope(kind, &envelope).await?;
        let call = HubCall::MirrorWithSig(MirrorWithSigData::from_envelope(&envelope, sig)?);
        self.relay_or_write(kind, &envelope.id, &signature, call)
            .await
    }

    async fn run_create_profile(
        &self,
        handle: &str,
        picture_uri: Option<String>,
    ) -> Result<ActionReceipt> {
        let kind = ActionKind::CreateProfile;
        self.stage(kind, ActionStage::Validating);
        self.require_wallet()?;
        self.require_chain()?;
        let handle = normalize_handle(handle);
        validate_handle(&handle)?;

        self.stage(kind, ActionStage::Broadcasting);
        let request = CreateProfileRequest {
            profile_picture_uri: picture_uri.unwrap_or_else(|| default_avatar(&handle)),
            handle,
        };
        match self.indexer.create_profile(&request).await? {
            BroadcastOutcome::Success { tx_hash } => Ok(ActionReceipt {
                kind,
                tx_hash,
                route: SubmissionRoute::Relay,
            }),
            BroadcastOutcome::Rejected { reason } => Err(MarbelError::RelayRejected(reason)),
        }
    }

    async fn run_login(&self, session: &mut Session) -> Result<()> {
        let kind = ActionKind::Login;
        self.stage(kind, ActionStage::Validating);
        // Login signs a plain message; no chain gate.
        let address = self.require_wallet()?.to_string();

        let challenge = self.indexer.challenge(&address).await?;
        self.stage(kind, ActionStage::AwaitingSignature);
        let signature = self.wallet.sign_message(&challenge).await?;
        let tokens = self.indexer.authenticate(&address, &signature).await?;
        self.indexer.set_access_token(Some(tokens.access_token.clone()));

        let profiles = self
            .indexer
            .profiles_owned_by(&address)
            .await?
            .into_iter()
            .map(|p| SessionProfile {
                id: p.id,
                handle: p.handle,
            })
            .collect();
        session.login(profiles, tokens).await
    }

    fn require_wallet(&self) -> Result<Address> {
        self.wallet.address().ok_or(MarbelError::WalletNotConnected)
    }

    fn require_chain(&self) -> Result<()> {
        let actual = self.wallet.chain_id();
        if actual != self.config.chain_id {
            return Err(MarbelError::WrongNetwork {
                expected: self.config.chain_id,
                actual,
            });
        }
        Ok(())
    }

    /// Upload publication metadata and build the gateway contentURI.
    async fn upload_metadata(
        &self,
        kind: ActionKind,
        metadata: &PublicationMetadata,
    ) -> Result<String> {
        self.stage(kind, ActionStage::UploadingContent);
        let path = self.content.upload(metadata).await?;
        Ok(gateway_uri(&self.config.ipfs_gateway, &path))
    }

    /// Present the sanitized envelope to the wallet. Returns the raw
    /// signature for the relayer and its split form for a direct write.
    async fn sign_envelope(
        &self,
        kind: ActionKind,
        envelope: &TypedDataEnvelope,
    ) -> Result<(Hex, Eip712Signature)> {
        self.stage(kind, ActionStage::AwaitingSignature);
        let signature = self.wallet.sign_typed_data(&envelope.sanitized()).await?;
        let sig = Eip712Signature::from_raw(&signature, envelope.deadline()?)?;
        Ok((signature, sig))
    }

    /// Submit the signed action: relayed broadcast when enabled, otherwise
    /// a direct hub write. A broadcast transport failure or the NOT_ALLOWED
    /// rejection routes to the write; any other rejection reason is
    /// terminal. At most one of the two paths submits.
    async fn relay_or_write(
        &self,
        kind: ActionKind,
        envelope_id: &str,
        signature: &str,
        call: HubCall,
    ) -> Result<ActionReceipt> {
        if self.config.relay_on {
            self.stage(kind, ActionStage::Broadcasting);
            match self.indexer.broadcast(envelope_id, signature).await {
                Ok(BroadcastOutcome::Success { tx_hash }) => {
                    return Ok(ActionReceipt {
                        kind,
                        tx_hash,
                        route: SubmissionRoute::Relay,
                    });
                }
                Ok(BroadcastOutcome::Rejected { reason }) => {
                    if reason != RELAY_NOT_ALLOWED {
                        return Err(MarbelError::RelayRejected(reason));
                    }
                    warn!(action = kind.name(), "relayer declined, writing directly");
                }
                Err(e) => {
                    warn!(action = kind.name(), error = %e, "broadcast failed, writing directly");
                }
            }
        }

        self.stage(kind, ActionStage::FallbackWriting);
        let tx_hash = self.wallet.write(self.config.hub_address, &call).await?;
        Ok(ActionReceipt {
            kind,
            tx_hash,
            route: SubmissionRoute::Direct,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Notify;

    use marbel_indexer::model::Profile;
    use marbel_session::MemoryStore;
    use marbel_signing::TypedData;
    use marbel_types::AuthTokens;
    use marbel_wallet::FixedWallet;

    enum Reply {
        Success(&'static str),
        Rejected(&'static str),
        Transport,
    }

    struct FakeIndexer {
        broadcast_reply: Reply,
        profile_reply: Reply,
        comment_requests: Mutex<Vec<CreateCommentRequest>>,
        post_requests: Mutex<Vec<CreatePostRequest>>,
        mirror_requests: Mutex<Vec<CreateMirrorRequest>>,
        profile_requests: Mutex<Vec<CreateProfileRequest>>,
        broadcasts: Mutex<Vec<(String, String)>>,
        auth_calls: Mutex<usize>,
        token: Mutex<Option<String>>,
    }

    impl FakeIndexer {
        fn new() -> Self {
            Self {
                broadcast_reply: Reply::Success("0xabc"),
                profile_reply: Reply::Success("0xabc"),
                comment_requests: Mutex::new(Vec::new()),
                post_requests: Mutex::new(Vec::new()),
                mirror_requests: Mutex::new(Vec::new()),
                profile_requests: Mutex::new(Vec::new()),
                broadcasts: Mutex::new(Vec::new()),
                auth_calls: Mutex::new(0),
                token: Mutex::new(None),
            }
        }

        fn broadcast_rejected(reason: &'static str) -> Self {
            Self {
                broadcast_reply: Reply::Rejected(reason),
                ..Self::new()
            }
        }

        fn broadcast_failing() -> Self {
            Self {
                broadcast_reply: Reply::Transport,
                ..Self::new()
            }
        }

        fn profile_rejected(reason: &'static str) -> Self {
            Self {
                profile_reply: Reply::Rejected(reason),
                ..Self::new()
            }
        }

        fn network_calls(&self) -> usize {
            self.comment_requests.lock().unwrap().len()
                + self.post_requests.lock().unwrap().len()
                + self.mirror_requests.lock().unwrap().len()
                + self.profile_requests.lock().unwrap().len()
                + self.broadcasts.lock().unwrap().len()
                + *self.auth_calls.lock().unwrap()
        }

        fn broadcasts(&self) -> Vec<(String, String)> {
            self.broadcasts.lock().unwrap().clone()
        }
    }

    fn reply_outcome(reply: &Reply) -> Result<BroadcastOutcome> {
        match reply {
            Reply::Success(hash) => Ok(BroadcastOutcome::Success {
                tx_hash: (*hash).into(),
            }),
            Reply::Rejected(reason) => Ok(BroadcastOutcome::Rejected {
                reason: (*reason).into(),
            }),
            Reply::Transport => Err(MarbelError::Api("relayer unreachable".into())),
        }
    }

    fn envelope(value: serde_json::Value) -> TypedDataEnvelope {
        TypedDataEnvelope {
            id: "envelope-1".into(),
            expires_at: "2022-05-06T12:00:00Z".into(),
            typed_data: TypedData {
                domain: json!({
                    "__typename": "EIP712TypedDataDomain",
                    "name": "Lens Protocol Profiles",
                    "chainId": 80001,
                    "version": "1",
                    "verifyingContract": "0x60ae865ee4c725cd04353b5aab364553f56cef82"
                }),
                types: json!({ "__typename": "EIP712TypedDataTypes" }),
                value,
            },
        }
    }

    #[async_trait]
    impl IndexerApi for FakeIndexer {
        async fn create_comment_typed_data(
            &self,
            request: &CreateCommentRequest,
        ) -> Result<TypedDataEnvelope> {
            self.comment_requests.lock().unwrap().push(request.clone());
            Ok(envelope(json!({
                "__typename": "CreateCommentEIP712TypedDataValue",
                "nonce": 7,
                "deadline": 1651845600u64,
                "profileId": request.profile_id,
                "profileIdPointed": "0x2d",
                "pubIdPointed": request.publication_id,
                "contentURI": request.content_uri,
                "collectModule": "0x6e0d0d6baa5f8ca9a0fbf6b03f4a1e70f9e7dd24",
                "collectModuleInitData": "0x",
                "referenceModule": "0x0000000000000000000000000000000000000000",
                "referenceModuleData": "0x",
                "referenceModuleInitData": "0x"
            })))
        }

        async fn create_post_typed_data(
            &self,
            request: &CreatePostRequest,
        ) -> Result<TypedDataEnvelope> {
            self.post_requests.lock().unwrap().push(request.clone());
            Ok(envelope(json!({
                "__typename": "CreatePostEIP712TypedDataValue",
                "nonce": 8,
                "deadline": 1651845600u64,
                "profileId": request.profile_id,
                "contentURI": request.content_uri,
                "collectModule": "0x6e0d0d6baa5f8ca9a0fbf6b03f4a1e70f9e7dd24",
                "collectModuleInitData": "0x",
                "referenceModule": "0x0000000000000000000000000000000000000000",
                "referenceModuleInitData": "0x"
            })))
        }

        async fn create_mirror_typed_data(
            &self,
            request: &CreateMirrorRequest,
        ) -> Result<TypedDataEnvelope> {
            self.mirror_requests.lock().unwrap().push(request.clone());
            Ok(envelope(json!({
                "__typename": "CreateMirrorEIP712TypedDataValue",
                "nonce": 9,
                "deadline": 1651845600u64,
                "profileId": request.profile_id,
                "profileIdPointed": "0x2d",
                "pubIdPointed": request.publication_id,
                "referenceModule": "0x0000000000000000000000000000000000000000",
                "referenceModuleData": "0x",
                "referenceModuleInitData": "0x"
            })))
        }

        async fn broadcast(&self, id: &str, signature: &str) -> Result<BroadcastOutcome> {
            self.broadcasts
                .lock()
                .unwrap()
                .push((id.to_string(), signature.to_string()));
            reply_outcome(&self.broadcast_reply)
        }

        async fn create_profile(
            &self,
            request: &CreateProfileRequest,
        ) -> Result<BroadcastOutcome> {
            self.profile_requests.lock().unwrap().push(request.clone());
            reply_outcome(&self.profile_reply)
        }

        async fn challenge(&self, address: &str) -> Result<String> {
            *self.auth_calls.lock().unwrap() += 1;
            Ok(format!("Login to Marbel with {address}"))
        }

        async fn authenticate(&self, _address: &str, _signature: &str) -> Result<AuthTokens> {
            *self.auth_calls.lock().unwrap() += 1;
            Ok(AuthTokens {
                access_token: "access-1".into(),
                refresh_token: "refresh-1".into(),
            })
        }

        async fn profiles_owned_by(&self, address: &str) -> Result<Vec<Profile>> {
            *self.auth_calls.lock().unwrap() += 1;
            Ok(vec![Profile {
                id: "0x0f".into(),
                handle: "stani".into(),
                owned_by: address.to_string(),
                name: None,
                bio: None,
                attributes: Vec::new(),
                stats: None,
                picture: None,
                cover_picture: None,
                follow_module: None,
            }])
        }

        fn set_access_token(&self, token: Option<String>) {
            *self.token.lock().unwrap() = token;
        }
    }

    #[derive(Default)]
    struct FakeContent {
        uploads: Mutex<Vec<PublicationMetadata>>,
    }

    #[async_trait]
    impl ContentStore for FakeContent {
        async fn upload(&self, metadata: &PublicationMetadata) -> Result<String> {
            self.uploads.lock().unwrap().push(metadata.clone());
            Ok("Qm123".into())
        }
    }

    /// Holds the upload open until released, to keep a run in flight.
    struct GatedContent {
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl ContentStore for GatedContent {
        async fn upload(&self, _metadata: &PublicationMetadata) -> Result<String> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok("Qm123".into())
        }
    }

    fn author() -> SessionProfile {
        SessionProfile {
            id: "0x0f".into(),
            handle: "stani".into(),
        }
    }

    fn engine_with(
        indexer: Arc<FakeIndexer>,
        wallet: Arc<FixedWallet>,
    ) -> (ActionEngine, Arc<FakeContent>) {
        let content = Arc::new(FakeContent::default());
        let engine = ActionEngine::new(
            ProtocolConfig::default(),
            indexer,
            content.clone(),
            wallet,
            None,
        );
        (engine, content)
    }

    fn capture() -> (ActionEventHandler, Arc<Mutex<Vec<ActionEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let handler: ActionEventHandler = Box::new(move |event| {
            sink.lock().unwrap().push(event);
        });
        (handler, events)
    }

    fn stages(events: &[ActionEvent]) -> Vec<ActionStage> {
        events
            .iter()
            .filter_map(|e| match e {
                ActionEvent::Stage { stage, .. } => Some(*stage),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_disconnected_wallet_short_circuits_every_action() {
        let indexer = Arc::new(FakeIndexer::new());
        let wallet = Arc::new(FixedWallet::disconnected());
        let (engine, content) = engine_with(indexer.clone(), wallet);

        let mut draft = PublicationDraft::text("gm");
        let err = engine.comment(&author(), "0x2d-0x01", &mut draft).await;
        assert!(matches!(err, Err(MarbelError::WalletNotConnected)));
        let err = engine.post(&author(), &mut draft).await;
        assert!(matches!(err, Err(MarbelError::WalletNotConnected)));
        let err = engine.mirror(&author(), "0x2d-0x01").await;
        assert!(matches!(err, Err(MarbelError::WalletNotConnected)));
        let err = engine.create_profile("stani", None).await;
        assert!(matches!(err, Err(MarbelError::WalletNotConnected)));

        assert_eq!(indexer.network_calls(), 0);
        assert!(content.uploads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_chain_blocks_before_upload_and_typed_data() {
        let indexer = Arc::new(FakeIndexer::new());
        let wallet = Arc::new(FixedWallet::new(1));
        let (engine, content) = engine_with(indexer.clone(), wallet);

        let mut draft = PublicationDraft::text("gm");
        let err = engine
            .comment(&author(), "0x2d-0x01", &mut draft)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MarbelError::WrongNetwork {
                expected: 80001,
                actual: 1
            }
        ));
        assert_eq!(indexer.network_calls(), 0);
        assert!(content.uploads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_comment_never_reaches_the_network() {
        let indexer = Arc::new(FakeIndexer::new());
        let wallet = Arc::new(FixedWallet::new(80001));
        let (engine, content) = engine_with(indexer.clone(), wallet);

        let mut draft = PublicationDraft::default();
        let err = engine
            .comment(&author(), "0x2d-0x01", &mut draft)
            .await
            .unwrap_err();
        assert!(matches!(err, MarbelError::EmptyPublication));
        assert_eq!(indexer.network_calls(), 0);
        assert!(content.uploads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_comment_relay_success_end_to_end() {
        let indexer = Arc::new(FakeIndexer::new());
        let wallet = Arc::new(FixedWallet::new(80001));
        let (engine, content) = engine_with(indexer.clone(), wallet.clone());

        let mut draft = PublicationDraft::text("gm");
        let receipt = engine
            .comment(&author(), "0x2d-0x01", &mut draft)
            .await
            .unwrap();

        assert_eq!(receipt.tx_hash, "0xabc");
        assert_eq!(receipt.route, SubmissionRoute::Relay);

        let uploads = content.uploads.lock().unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].content, "gm");
        assert_eq!(uploads[0].name, "Comment by @stani");
        assert_eq!(uploads[0].app_id, "Marbel");

        let requests = indexer.comment_requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].content_uri, "https://ipfs.infura.io/ipfs/Qm123");
        assert_eq!(requests[0].publication_id, "0x2d-0x01");

        assert_eq!(
            indexer.broadcasts(),
            vec![("envelope-1".to_string(), FixedWallet::SIGNATURE.to_string())]
        );
        assert!(wallet.writes().is_empty());

        // the wallet saw typed data with every __typename stripped
        let signed = wallet.signed_typed_data();
        assert_eq!(signed.len(), 1);
        let rendered = serde_json::to_string(&signed[0]).unwrap();
        assert!(!rendered.contains("__typename"), "{rendered}");

        // confirmed submission clears the compose form
        assert!(draft.content.is_empty());
        assert!(draft.attachments.is_empty());
    }

    #[tokio::test]
    async fn test_mirror_not_allowed_falls_back_to_one_direct_write() {
        let indexer = Arc::new(FakeIndexer::broadcast_rejected(RELAY_NOT_ALLOWED));
        let wallet = Arc::new(FixedWallet::new(80001));
        let (engine, _content) = engine_with(indexer.clone(), wallet.clone());

        let receipt = engine.mirror(&author(), "0x2d-0x01").await.unwrap();
        assert_eq!(receipt.route, SubmissionRoute::Direct);
        assert_eq!(receipt.tx_hash, FixedWallet::TX_HASH);

        assert_eq!(indexer.broadcasts().len(), 1);
        let writes = wallet.writes();
        assert_eq!(writes.len(), 1);
        let (hub, call) = &writes[0];
        assert_eq!(*hub, ProtocolConfig::default().hub_address);
        assert_eq!(call.method(), "mirrorWithSig");

        // the write reuses the one signature produced during the run
        let args = call.args().unwrap();
        assert_eq!(args["profileId"], "0x0f");
        assert_eq!(args["pubIdPointed"], "0x2d-0x01");
        assert_eq!(args["sig"]["v"], 27);
        assert_eq!(args["sig"]["r"], format!("0x{}", "11".repeat(32)));
        assert_eq!(args["sig"]["s"], format!("0x{}", "22".repeat(32)));
        assert_eq!(args["sig"]["deadline"], 1651845600u64);
    }

    #[tokio::test]
    async fn test_broadcast_transport_error_falls_back() {
        let indexer = Arc::new(FakeIndexer::broadcast_failing());
        let wallet = Arc::new(FixedWallet::new(80001));
        let (engine, _content) = engine_with(indexer.clone(), wallet.clone());

        let mut draft = PublicationDraft::text("gm");
        let receipt = engine
            .comment(&author(), "0x2d-0x01", &mut draft)
            .await
            .unwrap();
        assert_eq!(receipt.route, SubmissionRoute::Direct);
        assert_eq!(indexer.broadcasts().len(), 1);
        assert_eq!(wallet.writes().len(), 1);
        // the fallback confirmation still clears the draft
        assert!(draft.content.is_empty());
    }

    #[tokio::test]
    async fn test_relay_rejection_other_than_not_allowed_is_terminal() {
        let indexer = Arc::new(FakeIndexer::broadcast_rejected("WRONG_WALLET_SIGNED"));
        let wallet = Arc::new(FixedWallet::new(80001));
        let (engine, _content) = engine_with(indexer.clone(), wallet.clone());

        let mut draft = PublicationDraft::text("gm");
        let err = engine
            .comment(&author(), "0x2d-0x01", &mut draft)
            .await
            .unwrap_err();
        assert!(matches!(err, MarbelError::RelayRejected(ref reason) if reason == "WRONG_WALLET_SIGNED"));
        assert!(wallet.writes().is_empty());
        // failure keeps what the user typed
        assert_eq!(draft.content, "gm");
    }

    #[tokio::test]
    async fn test_relay_disabled_skips_broadcast() {
        let indexer = Arc::new(FakeIndexer::new());
        let wallet = Arc::new(FixedWallet::new(80001));
        let content = Arc::new(FakeContent::default());
        let config = ProtocolConfig {
            relay_on: false,
            ..ProtocolConfig::default()
        };
        let engine = ActionEngine::new(config, indexer.clone(), content, wallet.clone(), None);

        let mut draft = PublicationDraft::text("gm");
        let receipt = engine.post(&author(), &mut draft).await.unwrap();
        assert_eq!(receipt.route, SubmissionRoute::Direct);
        assert!(indexer.broadcasts().is_empty());
        let writes = wallet.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].1.method(), "postWithSig");
    }

    #[tokio::test]
    async fn test_user_signature_rejection_stops_the_run() {
        let indexer = Arc::new(FakeIndexer::new());
        let wallet = Arc::new(FixedWallet::rejecting(80001));
        let (engine, _content) = engine_with(indexer.clone(), wallet.clone());

        let mut draft = PublicationDraft::text("gm");
        let err = engine
            .comment(&author(), "0x2d-0x01", &mut draft)
            .await
            .unwrap_err();
        assert!(matches!(err, MarbelError::UserRejected));
        assert!(indexer.broadcasts().is_empty());
        assert!(wallet.writes().is_empty());
        assert_eq!(draft.content, "gm");
    }

    #[tokio::test]
    async fn test_create_profile_normalizes_handle_and_defaults_avatar() {
        let indexer = Arc::new(FakeIndexer::new());
        let wallet = Arc::new(FixedWallet::new(80001));
        let (engine, _content) = engine_with(indexer.clone(), wallet);

        let receipt = engine.create_profile("Stani", None).await.unwrap();
        assert_eq!(receipt.route, SubmissionRoute::Relay);
        assert_eq!(receipt.tx_hash, "0xabc");

        let requests = indexer.profile_requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].handle, "stani");
        assert_eq!(
            requests[0].profile_picture_uri,
            "https://avatar.tobi.sh/stani.png"
        );
    }

    #[tokio::test]
    async fn test_create_profile_keeps_supplied_picture() {
        let indexer = Arc::new(FakeIndexer::new());
        let wallet = Arc::new(FixedWallet::new(80001));
        let (engine, _content) = engine_with(indexer.clone(), wallet);

        engine
            .create_profile("stani", Some("ipfs://QmAvatar".into()))
            .await
            .unwrap();
        let requests = indexer.profile_requests.lock().unwrap();
        assert_eq!(requests[0].profile_picture_uri, "ipfs://QmAvatar");
    }

    #[tokio::test]
    async fn test_create_profile_invalid_handle_blocked() {
        let indexer = Arc::new(FakeIndexer::new());
        let wallet = Arc::new(FixedWallet::new(80001));
        let (engine, _content) = engine_with(indexer.clone(), wallet);

        let err = engine.create_profile("x", None).await.unwrap_err();
        assert!(matches!(err, MarbelError::InvalidHandle(_)));
        assert_eq!(indexer.network_calls(), 0);
    }

    #[tokio::test]
    async fn test_create_profile_rejection_surfaces_reason() {
        let indexer = Arc::new(FakeIndexer::profile_rejected("HANDLE_TAKEN"));
        let wallet = Arc::new(FixedWallet::new(80001));
        let (engine, _content) = engine_with(indexer, wallet);

        let err = engine.create_profile("stani", None).await.unwrap_err();
        assert!(err.to_string().contains("HANDLE_TAKEN"), "{err}");
    }

    #[tokio::test]
    async fn test_login_installs_token_and_adopts_profiles() {
        let indexer = Arc::new(FakeIndexer::new());
        let wallet = Arc::new(FixedWallet::new(80001));
        let (engine, _content) = engine_with(indexer.clone(), wallet.clone());
        let mut session = Session::new(Arc::new(MemoryStore::new()));

        engine.login(&mut session).await.unwrap();

        let messages = wallet.signed_messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("Login to Marbel"), "{}", messages[0]);

        assert_eq!(*indexer.token.lock().unwrap(), Some("access-1".to_string()));
        assert!(session.is_authenticated());
        assert_eq!(session.current_profile().map(|p| p.handle.as_str()), Some("stani"));

        engine.logout(&mut session).await.unwrap();
        assert!(indexer.token.lock().unwrap().is_none());
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn test_one_action_per_kind_at_a_time() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let indexer = Arc::new(FakeIndexer::new());
        let wallet = Arc::new(FixedWallet::new(80001));
        let engine = Arc::new(ActionEngine::new(
            ProtocolConfig::default(),
            indexer,
            Arc::new(GatedContent {
                entered: entered.clone(),
                release: release.clone(),
            }),
            wallet,
            None,
        ));

        let first = {
            let engine = engine.clone();
            tokio::spawn(async move {
                let mut draft = PublicationDraft::text("gm");
                engine.comment(&author(), "0x2d-0x01", &mut draft).await
            })
        };
        entered.notified().await;

        let mut second = PublicationDraft::text("second");
        let err = engine
            .comment(&author(), "0x2d-0x01", &mut second)
            .await
            .unwrap_err();
        assert!(matches!(err, MarbelError::ActionInFlight("comment")));

        // a different kind is free to run while the comment is pending
        engine.mirror(&author(), "0x2d-0x01").await.unwrap();

        release.notify_one();
        assert!(first.await.unwrap().is_ok());

        // the slot frees once the run completes
        release.notify_one(); // stored permit for the re-entry's upload
        let mut third = PublicationDraft::text("third");
        engine
            .comment(&author(), "0x2d-0x01", &mut third)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_events_report_pipeline_stages_in_order() {
        let (handler, events) = capture();
        let indexer = Arc::new(FakeIndexer::new());
        let wallet = Arc::new(FixedWallet::new(80001));
        let engine = ActionEngine::new(
            ProtocolConfig::default(),
            indexer,
            Arc::new(FakeContent::default()),
            wallet,
            Some(handler),
        );

        let mut draft = PublicationDraft::text("gm");
        engine
            .comment(&author(), "0x2d-0x01", &mut draft)
            .await
            .unwrap();

        let events = events.lock().unwrap();
        assert!(matches!(events.first(), Some(ActionEvent::Started { .. })));
        assert_eq!(
            stages(&events),
            vec![
                ActionStage::Validating,
                ActionStage::UploadingContent,
                ActionStage::RequestingTypedData,
                ActionStage::AwaitingSignature,
                ActionStage::Broadcasting,
            ]
        );
        assert!(matches!(
            events.last(),
            Some(ActionEvent::Confirmed {
                route: SubmissionRoute::Relay,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_failure_emits_failed_event() {
        let (handler, events) = capture();
        let indexer = Arc::new(FakeIndexer::new());
        let wallet = Arc::new(FixedWallet::new(1));
        let engine = ActionEngine::new(
            ProtocolConfig::default(),
            indexer,
            Arc::new(FakeContent::default()),
            wallet,
            Some(handler),
        );

        let mut draft = PublicationDraft::text("gm");
        engine
            .comment(&author(), "0x2d-0x01", &mut draft)
            .await
            .unwrap_err();

        let events = events.lock().unwrap();
        match events.last() {
            Some(ActionEvent::Failed { kind, message }) => {
                assert_eq!(*kind, ActionKind::Comment);
                assert!(message.contains("wrong network"), "{message}");
            }
            other => panic!("expected Failed event, got {other:?}"),
        }
    }
}
