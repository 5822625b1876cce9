//! # Outbound Ports
//!
//! Traits for the external collaborators: encryption engine, ledger client,
//! decryption signature provider and decryption engine.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, Semaphore};

use crate::domain::{
    AccountAddress, AssessmentHandles, AssessmentRecord, CollaboratorError, CollaboratorKind,
    ContractAddress, Handle, TxHash,
};

/// Ciphertext handles plus the proof binding them to contract and user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedInput {
    /// One handle per appended value, in order.
    pub handles: Vec<Handle>,
    /// Input proof.
    pub input_proof: Vec<u8>,
}

/// Encryption engine - outbound port.
pub trait EncryptionEngine: Send + Sync {
    /// Whether the engine has finished loading.
    fn is_ready(&self) -> bool {
        true
    }

    /// Start a batch of values bound to `contract` and `user`.
    fn new_input_batch(
        &self,
        contract: ContractAddress,
        user: AccountAddress,
    ) -> Box<dyn InputBatch>;
}

/// Values waiting to be encrypted together.
#[async_trait]
pub trait InputBatch: Send {
    /// Append a 32-bit integer.
    fn add_u32(&mut self, value: u32);

    /// Encrypt everything appended so far.
    async fn encrypt(&mut self) -> Result<EncryptedInput, CollaboratorError>;
}

/// Receipt of a mined transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TxReceipt {
    /// Transaction hash.
    pub hash: TxHash,
    /// Execution status.
    pub succeeded: bool,
    /// Block the transaction landed in.
    pub block_number: u64,
}

/// A transaction accepted by the ledger but not yet confirmed.
#[async_trait]
pub trait PendingTransaction: Send {
    /// Transaction hash.
    fn hash(&self) -> TxHash;

    /// Wait until the transaction is `confirmations` blocks deep.
    async fn wait(&mut self, confirmations: u32) -> Result<TxReceipt, CollaboratorError>;
}

/// Ledger client - outbound port.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Submit encrypted answers on behalf of `signer`.
    async fn submit_assessment(
        &self,
        contract: ContractAddress,
        signer: AccountAddress,
        input: &EncryptedInput,
    ) -> Result<Box<dyn PendingTransaction>, CollaboratorError>;

    /// Read the result handles stored for `account`.
    async fn read_assessment(
        &self,
        contract: ContractAddress,
        account: AccountAddress,
    ) -> Result<AssessmentRecord, CollaboratorError>;

    /// Whether `account` has submitted an assessment.
    async fn has_assessment(
        &self,
        contract: ContractAddress,
        account: AccountAddress,
    ) -> Result<bool, CollaboratorError>;
}

/// Decryption authorization artifact.
///
/// Opaque to the orchestrator; only the providers and the decryption
/// engine look inside.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptionSignature {
    /// Ephemeral public key.
    pub public_key: Vec<u8>,
    /// Ephemeral private key.
    pub private_key: Vec<u8>,
    /// Signature over the authorization request.
    pub signature: Vec<u8>,
    /// Contracts the artifact covers.
    pub contract_addresses: Vec<ContractAddress>,
    /// Signer the artifact is bound to.
    pub user_address: AccountAddress,
    /// Start of validity, seconds since UNIX epoch.
    pub start_timestamp: u64,
    /// Validity length in days.
    pub duration_days: u64,
}

impl DecryptionSignature {
    /// End of validity, seconds since UNIX epoch.
    pub fn expires_at(&self) -> u64 {
        self.start_timestamp
            .saturating_add(self.duration_days.saturating_mul(24 * 60 * 60))
    }

    /// Whether the artifact is valid at `now`.
    pub fn is_valid_at(&self, now: u64) -> bool {
        now >= self.start_timestamp && now < self.expires_at()
    }

    /// Whether the artifact covers `contract`.
    pub fn covers(&self, contract: &ContractAddress) -> bool {
        self.contract_addresses.contains(contract)
    }
}

/// Decryption signature provider - outbound port.
#[async_trait]
pub trait SignatureProvider: Send + Sync {
    /// Reuse a cached artifact or ask the signer for a new one.
    ///
    /// `Ok(None)` means none could be produced.
    async fn load_or_create(
        &self,
        contracts: &[ContractAddress],
        signer: AccountAddress,
    ) -> Result<Option<DecryptionSignature>, CollaboratorError>;
}

/// One handle to reveal, with the contract that owns it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandleContractPair {
    /// Ciphertext handle.
    pub handle: Handle,
    /// Owning contract.
    pub contract: ContractAddress,
}

/// Decryption engine - outbound port.
#[async_trait]
pub trait DecryptionEngine: Send + Sync {
    /// Reveal a batch of handles. Handles absent from the map were not
    /// revealed.
    async fn user_decrypt(
        &self,
        requests: &[HandleContractPair],
        signature: &DecryptionSignature,
    ) -> Result<HashMap<Handle, u64>, CollaboratorError>;
}

/// The four collaborators the orchestrator drives.
#[derive(Clone)]
pub struct Collaborators {
    /// Encryption engine.
    pub encryption: Arc<dyn EncryptionEngine>,
    /// Ledger client.
    pub ledger: Arc<dyn LedgerClient>,
    /// Decryption signature provider.
    pub signatures: Arc<dyn SignatureProvider>,
    /// Decryption engine.
    pub decryption: Arc<dyn DecryptionEngine>,
}

// =============================================================================
// Mock Implementations for Testing
// =============================================================================

/// Suspension point for mocks.
///
/// A gated mock call signals `entered` and then waits until the test opens
/// the gate, so identity switches can be injected mid-flight.
pub struct Gate {
    entered: Notify,
    release: Semaphore,
}

impl Gate {
    /// Create a closed gate.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entered: Notify::new(),
            release: Semaphore::new(0),
        })
    }

    /// Called by the mock: announce arrival, then wait for `open`.
    pub async fn pass(&self) {
        self.entered.notify_one();
        if let Ok(permit) = self.release.acquire().await {
            permit.forget();
        }
    }

    /// Wait until a mock call reached the gate.
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    /// Let one waiting call through.
    pub fn open(&self) {
        self.release.add_permits(1);
    }
}

async fn pass_gate(slot: &Mutex<Option<Arc<Gate>>>) {
    let gate = slot.lock().clone();
    if let Some(gate) = gate {
        gate.pass().await;
    }
}

fn scripted_failure(
    slot: &Mutex<Option<String>>,
    kind: CollaboratorKind,
) -> Result<(), CollaboratorError> {
    match slot.lock().clone() {
        Some(message) => Err(CollaboratorError::new(kind, message)),
        None => Ok(()),
    }
}

/// Mock encryption engine recording every encrypted batch.
pub struct MockEncryption {
    ready: AtomicBool,
    batches: Arc<Mutex<Vec<Vec<u32>>>>,
    gate: Arc<Mutex<Option<Arc<Gate>>>>,
    failure: Arc<Mutex<Option<String>>>,
}

impl Default for MockEncryption {
    fn default() -> Self {
        Self {
            ready: AtomicBool::new(true),
            batches: Arc::new(Mutex::new(Vec::new())),
            gate: Arc::new(Mutex::new(None)),
            failure: Arc::new(Mutex::new(None)),
        }
    }
}

impl MockEncryption {
    /// Mark the engine loaded or not.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Suspend `encrypt` at `gate`.
    pub fn set_gate(&self, gate: Arc<Gate>) {
        *self.gate.lock() = Some(gate);
    }

    /// Make `encrypt` fail with `message`.
    pub fn fail_with(&self, message: &str) {
        *self.failure.lock() = Some(message.to_string());
    }

    /// Values of every batch that reached `encrypt`.
    pub fn encrypted_batches(&self) -> Vec<Vec<u32>> {
        self.batches.lock().clone()
    }
}

impl EncryptionEngine for MockEncryption {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn new_input_batch(
        &self,
        _contract: ContractAddress,
        _user: AccountAddress,
    ) -> Box<dyn InputBatch> {
        Box::new(MockBatch {
            values: Vec::new(),
            batches: Arc::clone(&self.batches),
            gate: Arc::clone(&self.gate),
            failure: Arc::clone(&self.failure),
        })
    }
}

struct MockBatch {
    values: Vec<u32>,
    batches: Arc<Mutex<Vec<Vec<u32>>>>,
    gate: Arc<Mutex<Option<Arc<Gate>>>>,
    failure: Arc<Mutex<Option<String>>>,
}

#[async_trait]
impl InputBatch for MockBatch {
    fn add_u32(&mut self, value: u32) {
        self.values.push(value);
    }

    async fn encrypt(&mut self) -> Result<EncryptedInput, CollaboratorError> {
        self.batches.lock().push(self.values.clone());
        pass_gate(&self.gate).await;
        scripted_failure(&self.failure, CollaboratorKind::Encryption)?;
        let handles = (0..self.values.len())
            .map(|i| {
                let mut bytes = [0u8; 32];
                bytes[0] = 0xE0;
                bytes[31] = i as u8 + 1;
                Handle(bytes)
            })
            .collect();
        Ok(EncryptedInput {
            handles,
            input_proof: vec![0xAA; 4],
        })
    }
}

/// Mock ledger with a scripted stored record.
pub struct MockLedger {
    record: Arc<Mutex<AssessmentRecord>>,
    has_assessment: Arc<AtomicBool>,
    receipt_succeeds: AtomicBool,
    confirmed_handles: Mutex<Option<AssessmentHandles>>,
    submissions: Mutex<Vec<EncryptedInput>>,
    reads: AtomicUsize,
    read_gate: Mutex<Option<Arc<Gate>>>,
    check_gate: Mutex<Option<Arc<Gate>>>,
    confirm_gate: Arc<Mutex<Option<Arc<Gate>>>>,
    submit_failure: Mutex<Option<String>>,
    read_failure: Mutex<Option<String>>,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self {
            record: Arc::new(Mutex::new(AssessmentRecord {
                handles: AssessmentHandles::EMPTY,
                timestamp: 0,
            })),
            has_assessment: Arc::new(AtomicBool::new(false)),
            receipt_succeeds: AtomicBool::new(true),
            confirmed_handles: Mutex::new(None),
            submissions: Mutex::new(Vec::new()),
            reads: AtomicUsize::new(0),
            read_gate: Mutex::new(None),
            check_gate: Mutex::new(None),
            confirm_gate: Arc::new(Mutex::new(None)),
            submit_failure: Mutex::new(None),
            read_failure: Mutex::new(None),
        }
    }
}

impl MockLedger {
    /// Script the handles returned by reads.
    pub fn set_handles(&self, handles: AssessmentHandles) {
        *self.record.lock() = AssessmentRecord {
            handles,
            timestamp: 1_700_000_000,
        };
    }

    /// Script the `has_assessment` answer.
    pub fn set_has_assessment(&self, value: bool) {
        self.has_assessment.store(value, Ordering::SeqCst);
    }

    /// Store `handles` (and mark the assessment as existing) when a
    /// submission confirms.
    pub fn set_handles_on_confirm(&self, handles: AssessmentHandles) {
        *self.confirmed_handles.lock() = Some(handles);
    }

    /// Script the receipt status.
    pub fn set_receipt_succeeds(&self, value: bool) {
        self.receipt_succeeds.store(value, Ordering::SeqCst);
    }

    /// Suspend reads at `gate`.
    pub fn set_read_gate(&self, gate: Arc<Gate>) {
        *self.read_gate.lock() = Some(gate);
    }

    /// Remove the read gate.
    pub fn clear_read_gate(&self) {
        *self.read_gate.lock() = None;
    }

    /// Suspend existence checks at `gate`.
    pub fn set_check_gate(&self, gate: Arc<Gate>) {
        *self.check_gate.lock() = Some(gate);
    }

    /// Suspend confirmation waits at `gate`.
    pub fn set_confirm_gate(&self, gate: Arc<Gate>) {
        *self.confirm_gate.lock() = Some(gate);
    }

    /// Make submissions fail with `message`.
    pub fn fail_submit_with(&self, message: &str) {
        *self.submit_failure.lock() = Some(message.to_string());
    }

    /// Make reads fail with `message`.
    pub fn fail_reads_with(&self, message: &str) {
        *self.read_failure.lock() = Some(message.to_string());
    }

    /// Stop failing reads.
    pub fn heal_reads(&self) {
        *self.read_failure.lock() = None;
    }

    /// Every accepted submission.
    pub fn submissions(&self) -> Vec<EncryptedInput> {
        self.submissions.lock().clone()
    }

    /// Number of `read_assessment` calls.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn submit_assessment(
        &self,
        _contract: ContractAddress,
        _signer: AccountAddress,
        input: &EncryptedInput,
    ) -> Result<Box<dyn PendingTransaction>, CollaboratorError> {
        scripted_failure(&self.submit_failure, CollaboratorKind::Ledger)?;
        let mut submissions = self.submissions.lock();
        submissions.push(input.clone());
        let mut hash = [0u8; 32];
        hash[0] = 0x7E;
        hash[31] = submissions.len() as u8;
        Ok(Box::new(MockPendingTx {
            hash: TxHash(hash),
            succeeded: self.receipt_succeeds.load(Ordering::SeqCst),
            gate: Arc::clone(&self.confirm_gate),
            stores: *self.confirmed_handles.lock(),
            record: Arc::clone(&self.record),
            has_assessment: Arc::clone(&self.has_assessment),
        }))
    }

    async fn read_assessment(
        &self,
        _contract: ContractAddress,
        _account: AccountAddress,
    ) -> Result<AssessmentRecord, CollaboratorError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        // Answers reflect the ledger as of the block the call was issued at.
        let record = *self.record.lock();
        pass_gate(&self.read_gate).await;
        scripted_failure(&self.read_failure, CollaboratorKind::Ledger)?;
        Ok(record)
    }

    async fn has_assessment(
        &self,
        _contract: ContractAddress,
        _account: AccountAddress,
    ) -> Result<bool, CollaboratorError> {
        let exists = self.has_assessment.load(Ordering::SeqCst);
        pass_gate(&self.check_gate).await;
        Ok(exists)
    }
}

struct MockPendingTx {
    hash: TxHash,
    succeeded: bool,
    gate: Arc<Mutex<Option<Arc<Gate>>>>,
    stores: Option<AssessmentHandles>,
    record: Arc<Mutex<AssessmentRecord>>,
    has_assessment: Arc<AtomicBool>,
}

#[async_trait]
impl PendingTransaction for MockPendingTx {
    fn hash(&self) -> TxHash {
        self.hash
    }

    async fn wait(&mut self, _confirmations: u32) -> Result<TxReceipt, CollaboratorError> {
        pass_gate(&self.gate).await;
        if let (true, Some(handles)) = (self.succeeded, self.stores) {
            *self.record.lock() = AssessmentRecord {
                handles,
                timestamp: 1_700_000_000,
            };
            self.has_assessment.store(true, Ordering::SeqCst);
        }
        Ok(TxReceipt {
            hash: self.hash,
            succeeded: self.succeeded,
            block_number: 1,
        })
    }
}

/// Mock signature provider.
pub struct MockSignatureProvider {
    available: AtomicBool,
    calls: AtomicUsize,
    failure: Mutex<Option<String>>,
}

impl Default for MockSignatureProvider {
    fn default() -> Self {
        Self {
            available: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
            failure: Mutex::new(None),
        }
    }
}

impl MockSignatureProvider {
    /// Script whether an artifact can be produced.
    pub fn set_available(&self, value: bool) {
        self.available.store(value, Ordering::SeqCst);
    }

    /// Make calls fail with `message`.
    pub fn fail_with(&self, message: &str) {
        *self.failure.lock() = Some(message.to_string());
    }

    /// Number of `load_or_create` calls.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SignatureProvider for MockSignatureProvider {
    async fn load_or_create(
        &self,
        contracts: &[ContractAddress],
        signer: AccountAddress,
    ) -> Result<Option<DecryptionSignature>, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        scripted_failure(&self.failure, CollaboratorKind::Signature)?;
        if !self.available.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(Some(DecryptionSignature {
            public_key: vec![1; 32],
            private_key: vec![2; 32],
            signature: vec![3; 65],
            contract_addresses: contracts.to_vec(),
            user_address: signer,
            start_timestamp: 1_700_000_000,
            duration_days: 365,
        }))
    }
}

/// Mock decryption engine with a scripted plaintext table.
pub struct MockDecryption {
    values: Mutex<HashMap<Handle, u64>>,
    requests: Mutex<Vec<Vec<HandleContractPair>>>,
    gate: Mutex<Option<Arc<Gate>>>,
    failure: Mutex<Option<String>>,
}

impl Default for MockDecryption {
    fn default() -> Self {
        Self {
            values: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            gate: Mutex::new(None),
            failure: Mutex::new(None),
        }
    }
}

impl MockDecryption {
    /// Script the plaintext of `handle`.
    pub fn set_value(&self, handle: Handle, value: u64) {
        self.values.lock().insert(handle, value);
    }

    /// Suspend decryption at `gate`.
    pub fn set_gate(&self, gate: Arc<Gate>) {
        *self.gate.lock() = Some(gate);
    }

    /// Make calls fail with `message`.
    pub fn fail_with(&self, message: &str) {
        *self.failure.lock() = Some(message.to_string());
    }

    /// Stop failing.
    pub fn heal(&self) {
        *self.failure.lock() = None;
    }

    /// Every batch requested.
    pub fn requests(&self) -> Vec<Vec<HandleContractPair>> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl DecryptionEngine for MockDecryption {
    async fn user_decrypt(
        &self,
        requests: &[HandleContractPair],
        _signature: &DecryptionSignature,
    ) -> Result<HashMap<Handle, u64>, CollaboratorError> {
        self.requests.lock().push(requests.to_vec());
        pass_gate(&self.gate).await;
        scripted_failure(&self.failure, CollaboratorKind::Decryption)?;
        let values = self.values.lock();
        Ok(requests
            .iter()
            .filter_map(|r| values.get(&r.handle).map(|v| (r.handle, *v)))
            .collect())
    }
}
