//! Simulated Collaborators
//!
//! In-process stand-ins for the confidential-computation stack: a ciphertext
//! store with per-account read permissions, an encryption engine producing
//! proof-bound handles, a ledger that sums the answers per result field, a
//! caching signature provider and a permission-checking decryption engine.
//!
//! Ciphertexts are opaque handles derived with SHA-256; plaintexts never
//! leave the store except through [`SimulatedDecryption`].

use std::collections::{BTreeSet, HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::domain::{
    AccountAddress, AssessmentHandles, AssessmentRecord, CollaboratorError, CollaboratorKind,
    ContractAddress, Handle, TxHash, ANSWERS_PER_FIELD, ANSWER_COUNT,
};
use crate::ports::{
    Collaborators, DecryptionEngine, DecryptionSignature, EncryptedInput, EncryptionEngine,
    HandleContractPair, InputBatch, LedgerClient, PendingTransaction, SignatureProvider,
    TxReceipt,
};

/// Validity of freshly created decryption signatures.
pub const SIGNATURE_VALIDITY_DAYS: u64 = 365;

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Proof binding `handles` to `contract` and `user`.
pub fn input_proof(contract: &ContractAddress, user: &AccountAddress, handles: &[Handle]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(b"pe-input-proof");
    hasher.update(contract.as_bytes());
    hasher.update(user.as_bytes());
    for handle in handles {
        hasher.update(handle.as_bytes());
    }
    hasher.finalize().to_vec()
}

// =============================================================================
// Ciphertext store
// =============================================================================

struct Ciphertext {
    value: u64,
    contract: ContractAddress,
    readers: HashSet<AccountAddress>,
}

/// Ciphertext store with per-account read permissions.
#[derive(Default)]
pub struct SimulatedFhe {
    ciphertexts: Mutex<HashMap<Handle, Ciphertext>>,
    nonce: AtomicU64,
}

impl SimulatedFhe {
    /// Create an empty store.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn store(&self, contract: ContractAddress, value: u64, tag: &[u8]) -> Handle {
        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst);
        let mut hasher = Sha256::new();
        hasher.update(b"pe-ciphertext");
        hasher.update(nonce.to_be_bytes());
        hasher.update(contract.as_bytes());
        hasher.update(tag);
        let handle = Handle(hasher.finalize().into());
        self.ciphertexts.lock().insert(
            handle,
            Ciphertext {
                value,
                contract,
                readers: HashSet::new(),
            },
        );
        handle
    }

    /// Encrypt `value` as an input to `contract` from `user`.
    pub fn encrypt(&self, contract: ContractAddress, user: AccountAddress, value: u64) -> Handle {
        self.store(contract, value, user.as_bytes())
    }

    /// Homomorphic sum of `inputs`. `None` if any input is unknown.
    pub fn sum(&self, contract: ContractAddress, inputs: &[Handle]) -> Option<Handle> {
        let total = {
            let ciphertexts = self.ciphertexts.lock();
            inputs.iter().try_fold(0u64, |acc, handle| {
                ciphertexts.get(handle).map(|c| acc.saturating_add(c.value))
            })?
        };
        Some(self.store(contract, total, b"sum"))
    }

    /// Grant `account` the right to reveal `handle`.
    pub fn allow(&self, handle: &Handle, account: AccountAddress) {
        if let Some(ciphertext) = self.ciphertexts.lock().get_mut(handle) {
            ciphertext.readers.insert(account);
        }
    }

    /// Plaintext of `handle`, if `account` may read it through `contract`.
    pub fn reveal(
        &self,
        handle: &Handle,
        contract: &ContractAddress,
        account: &AccountAddress,
    ) -> Option<u64> {
        let ciphertexts = self.ciphertexts.lock();
        let ciphertext = ciphertexts.get(handle)?;
        (ciphertext.contract == *contract && ciphertext.readers.contains(account))
            .then_some(ciphertext.value)
    }

    /// Number of stored ciphertexts.
    pub fn len(&self) -> usize {
        self.ciphertexts.lock().len()
    }

    /// True if nothing was encrypted yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Encryption
// =============================================================================

/// Encryption engine over [`SimulatedFhe`].
pub struct SimulatedEncryption {
    fhe: Arc<SimulatedFhe>,
    ready: AtomicBool,
    latency: Duration,
}

impl SimulatedEncryption {
    /// Create a ready engine.
    pub fn new(fhe: Arc<SimulatedFhe>) -> Self {
        Self {
            fhe,
            ready: AtomicBool::new(true),
            latency: Duration::ZERO,
        }
    }

    /// Delay every `encrypt` by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Mark the engine loaded or not.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }
}

impl EncryptionEngine for SimulatedEncryption {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn new_input_batch(&self, contract: ContractAddress, user: AccountAddress) -> Box<dyn InputBatch> {
        Box::new(SimulatedBatch {
            fhe: Arc::clone(&self.fhe),
            contract,
            user,
            values: Vec::with_capacity(ANSWER_COUNT),
            latency: self.latency,
        })
    }
}

struct SimulatedBatch {
    fhe: Arc<SimulatedFhe>,
    contract: ContractAddress,
    user: AccountAddress,
    values: Vec<u32>,
    latency: Duration,
}

#[async_trait]
impl InputBatch for SimulatedBatch {
    fn add_u32(&mut self, value: u32) {
        self.values.push(value);
    }

    async fn encrypt(&mut self) -> Result<EncryptedInput, CollaboratorError> {
        if self.values.is_empty() {
            return Err(CollaboratorError::new(
                CollaboratorKind::Encryption,
                "empty input batch",
            ));
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let handles: Vec<Handle> = self
            .values
            .iter()
            .map(|v| self.fhe.encrypt(self.contract, self.user, u64::from(*v)))
            .collect();
        let input_proof = input_proof(&self.contract, &self.user, &handles);
        debug!(inputs = handles.len(), "Input batch encrypted");
        Ok(EncryptedInput {
            handles,
            input_proof,
        })
    }
}

// =============================================================================
// Ledger
// =============================================================================

/// Ledger holding one assessment record per (contract, account).
pub struct InMemoryLedger {
    fhe: Arc<SimulatedFhe>,
    block_time: Duration,
    fee: u64,
    balances: Mutex<HashMap<AccountAddress, u64>>,
    records: Mutex<HashMap<(ContractAddress, AccountAddress), AssessmentRecord>>,
    block_number: AtomicU64,
    rejects: AtomicBool,
}

impl InMemoryLedger {
    /// Create a ledger with instant blocks and free transactions.
    pub fn new(fhe: Arc<SimulatedFhe>) -> Self {
        Self {
            fhe,
            block_time: Duration::ZERO,
            fee: 0,
            balances: Mutex::new(HashMap::new()),
            records: Mutex::new(HashMap::new()),
            block_number: AtomicU64::new(0),
            rejects: AtomicBool::new(false),
        }
    }

    /// Wait `block_time` per confirmation.
    pub fn with_block_time(mut self, block_time: Duration) -> Self {
        self.block_time = block_time;
        self
    }

    /// Charge `fee` per submission.
    pub fn with_fee(mut self, fee: u64) -> Self {
        self.fee = fee;
        self
    }

    /// Credit `amount` to `account`.
    pub fn fund(&self, account: AccountAddress, amount: u64) {
        let mut balances = self.balances.lock();
        let balance = balances.entry(account).or_insert(0);
        *balance = balance.saturating_add(amount);
    }

    /// Balance of `account`.
    pub fn balance(&self, account: &AccountAddress) -> u64 {
        self.balances.lock().get(account).copied().unwrap_or(0)
    }

    /// Make the signer decline every transaction.
    pub fn set_signer_rejects(&self, rejects: bool) {
        self.rejects.store(rejects, Ordering::SeqCst);
    }

    /// Latest block.
    pub fn block_number(&self) -> u64 {
        self.block_number.load(Ordering::SeqCst)
    }

    fn charge(&self, signer: &AccountAddress) -> Result<(), CollaboratorError> {
        if self.fee == 0 {
            return Ok(());
        }
        let mut balances = self.balances.lock();
        let balance = balances.entry(*signer).or_insert(0);
        if *balance < self.fee {
            return Err(CollaboratorError::new(
                CollaboratorKind::Ledger,
                "insufficient funds for gas * price + value",
            ));
        }
        *balance -= self.fee;
        Ok(())
    }

    fn sum_fields(
        &self,
        contract: ContractAddress,
        inputs: &[Handle],
    ) -> Result<AssessmentHandles, CollaboratorError> {
        let mut sums = inputs
            .chunks(ANSWERS_PER_FIELD)
            .map(|chunk| self.fhe.sum(contract, chunk));
        let mut next = || {
            sums.next().flatten().ok_or_else(|| {
                CollaboratorError::new(CollaboratorKind::Ledger, "execution reverted: unknown ciphertext")
            })
        };
        Ok(AssessmentHandles {
            stress: next()?,
            extroversion: next()?,
            intuition: next()?,
        })
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn submit_assessment(
        &self,
        contract: ContractAddress,
        signer: AccountAddress,
        input: &EncryptedInput,
    ) -> Result<Box<dyn PendingTransaction>, CollaboratorError> {
        if self.rejects.load(Ordering::SeqCst) {
            return Err(CollaboratorError::new(
                CollaboratorKind::Ledger,
                "User rejected the request.",
            ));
        }
        if input.handles.len() != ANSWER_COUNT {
            return Err(CollaboratorError::new(
                CollaboratorKind::Ledger,
                format!(
                    "execution reverted: expected {ANSWER_COUNT} inputs, got {}",
                    input.handles.len()
                ),
            ));
        }
        if input.input_proof != input_proof(&contract, &signer, &input.handles) {
            return Err(CollaboratorError::new(
                CollaboratorKind::Ledger,
                "execution reverted: invalid input proof",
            ));
        }
        self.charge(&signer)?;

        let handles = self.sum_fields(contract, &input.handles)?;
        for (_, handle) in handles.present() {
            self.fhe.allow(&handle, signer);
        }
        self.records.lock().insert(
            (contract, signer),
            AssessmentRecord {
                handles,
                timestamp: unix_now(),
            },
        );
        let block_number = self.block_number.fetch_add(1, Ordering::SeqCst) + 1;

        let mut hasher = Sha256::new();
        hasher.update(contract.as_bytes());
        hasher.update(signer.as_bytes());
        hasher.update(&input.input_proof);
        hasher.update(block_number.to_be_bytes());
        let hash = TxHash(hasher.finalize().into());
        debug!(%hash, block_number, "Assessment stored");

        Ok(Box::new(SimulatedPendingTx {
            hash,
            block_number,
            block_time: self.block_time,
        }))
    }

    async fn read_assessment(
        &self,
        contract: ContractAddress,
        account: AccountAddress,
    ) -> Result<AssessmentRecord, CollaboratorError> {
        Ok(self
            .records
            .lock()
            .get(&(contract, account))
            .copied()
            .unwrap_or(AssessmentRecord {
                handles: AssessmentHandles::EMPTY,
                timestamp: 0,
            }))
    }

    async fn has_assessment(
        &self,
        contract: ContractAddress,
        account: AccountAddress,
    ) -> Result<bool, CollaboratorError> {
        Ok(self.records.lock().contains_key(&(contract, account)))
    }
}

struct SimulatedPendingTx {
    hash: TxHash,
    block_number: u64,
    block_time: Duration,
}

#[async_trait]
impl PendingTransaction for SimulatedPendingTx {
    fn hash(&self) -> TxHash {
        self.hash
    }

    async fn wait(&mut self, confirmations: u32) -> Result<TxReceipt, CollaboratorError> {
        let wait = self.block_time.saturating_mul(confirmations);
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
        Ok(TxReceipt {
            hash: self.hash,
            succeeded: true,
            block_number: self.block_number,
        })
    }
}

// =============================================================================
// Decryption signatures
// =============================================================================

type SignatureKey = (BTreeSet<ContractAddress>, AccountAddress);

/// Signature provider reusing still-valid artifacts per (contracts, signer).
pub struct CachingSignatureProvider {
    cache: Mutex<LruCache<SignatureKey, DecryptionSignature>>,
    duration_days: u64,
    declines: AtomicBool,
    created: AtomicUsize,
}

impl CachingSignatureProvider {
    /// Create a provider caching up to `capacity` artifacts.
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            duration_days: SIGNATURE_VALIDITY_DAYS,
            declines: AtomicBool::new(false),
            created: AtomicUsize::new(0),
        }
    }

    /// Make the signer decline new authorizations.
    pub fn set_declines(&self, declines: bool) {
        self.declines.store(declines, Ordering::SeqCst);
    }

    /// Number of artifacts created (cache misses).
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    fn create(&self, contracts: Vec<ContractAddress>, signer: AccountAddress) -> DecryptionSignature {
        let mut rng = rand::thread_rng();
        let mut public_key = vec![0u8; 32];
        let mut private_key = vec![0u8; 32];
        rng.fill_bytes(&mut public_key);
        rng.fill_bytes(&mut private_key);

        let start_timestamp = unix_now();
        let mut hasher = Sha256::new();
        hasher.update(&public_key);
        for contract in &contracts {
            hasher.update(contract.as_bytes());
        }
        hasher.update(signer.as_bytes());
        hasher.update(start_timestamp.to_be_bytes());
        hasher.update(self.duration_days.to_be_bytes());

        DecryptionSignature {
            public_key,
            private_key,
            signature: hasher.finalize().to_vec(),
            contract_addresses: contracts,
            user_address: signer,
            start_timestamp,
            duration_days: self.duration_days,
        }
    }
}

#[async_trait]
impl SignatureProvider for CachingSignatureProvider {
    async fn load_or_create(
        &self,
        contracts: &[ContractAddress],
        signer: AccountAddress,
    ) -> Result<Option<DecryptionSignature>, CollaboratorError> {
        let key: SignatureKey = (contracts.iter().copied().collect(), signer);
        let now = unix_now();

        if let Some(cached) = self.cache.lock().get(&key) {
            if cached.is_valid_at(now) {
                debug!(signer = %signer, "Reusing decryption signature");
                return Ok(Some(cached.clone()));
            }
        }
        if self.declines.load(Ordering::SeqCst) {
            return Ok(None);
        }

        let signature = self.create(key.0.iter().copied().collect(), signer);
        self.cache.lock().put(key, signature.clone());
        self.created.fetch_add(1, Ordering::SeqCst);
        debug!(signer = %signer, "Created decryption signature");
        Ok(Some(signature))
    }
}

// =============================================================================
// Decryption
// =============================================================================

/// Decryption engine enforcing the signature's scope and the store's
/// read permissions.
pub struct SimulatedDecryption {
    fhe: Arc<SimulatedFhe>,
}

impl SimulatedDecryption {
    /// Create an engine over `fhe`.
    pub fn new(fhe: Arc<SimulatedFhe>) -> Self {
        Self { fhe }
    }
}

#[async_trait]
impl DecryptionEngine for SimulatedDecryption {
    async fn user_decrypt(
        &self,
        requests: &[HandleContractPair],
        signature: &DecryptionSignature,
    ) -> Result<HashMap<Handle, u64>, CollaboratorError> {
        if !signature.is_valid_at(unix_now()) {
            return Err(CollaboratorError::new(
                CollaboratorKind::Decryption,
                "decryption signature expired",
            ));
        }
        let mut revealed = HashMap::with_capacity(requests.len());
        for request in requests {
            if !signature.covers(&request.contract) {
                return Err(CollaboratorError::new(
                    CollaboratorKind::Decryption,
                    format!("signature does not cover contract {}", request.contract),
                ));
            }
            if let Some(value) =
                self.fhe
                    .reveal(&request.handle, &request.contract, &signature.user_address)
            {
                revealed.insert(request.handle, value);
            }
        }
        debug!(requested = requests.len(), revealed = revealed.len(), "User decryption");
        Ok(revealed)
    }
}

// =============================================================================
// Wiring
// =============================================================================

/// The simulated collaborators sharing one ciphertext store.
pub struct SimulatedBackend {
    /// Ciphertext store
    pub fhe: Arc<SimulatedFhe>,
    /// Encryption engine
    pub encryption: Arc<SimulatedEncryption>,
    /// Ledger
    pub ledger: Arc<InMemoryLedger>,
    /// Signature provider
    pub signatures: Arc<CachingSignatureProvider>,
    /// Decryption engine
    pub decryption: Arc<SimulatedDecryption>,
}

impl SimulatedBackend {
    /// Instant blocks, free transactions.
    pub fn new() -> Self {
        Self::with_ledger(|ledger| ledger)
    }

    /// Customize the ledger before wiring.
    pub fn with_ledger(configure: impl FnOnce(InMemoryLedger) -> InMemoryLedger) -> Self {
        let fhe = SimulatedFhe::new();
        Self {
            encryption: Arc::new(SimulatedEncryption::new(Arc::clone(&fhe))),
            ledger: Arc::new(configure(InMemoryLedger::new(Arc::clone(&fhe)))),
            signatures: Arc::new(CachingSignatureProvider::new(16)),
            decryption: Arc::new(SimulatedDecryption::new(Arc::clone(&fhe))),
            fhe,
        }
    }

    /// Port view for the orchestrator.
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            encryption: self.encryption.clone(),
            ledger: self.ledger.clone(),
            signatures: self.signatures.clone(),
            decryption: self.decryption.clone(),
        }
    }
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new()
    }
}
