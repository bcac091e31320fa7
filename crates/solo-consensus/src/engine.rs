//! Solo consensus engine.
//!
//! The engine is a single actor: commands, timer ticks and commit
//! notifications all arrive through one mailbox and are handled one at a
//! time by [`ConsensusEngine::run`]. The timer and the ledger subscription
//! run as separate tasks that only enqueue messages.

use crate::block::{Block, BlockHash, BlockHeader};
use crate::error::{ConsensusError, Result};
use crate::replay::{ReplayGuard, DEFAULT_REPLAY_WINDOW};
use crate::service::{LedgerHandle, PoolHandle, SignerHandle};
use crate::transaction::Transaction;
use solo_program::{encode_parameter_program, encode_single_key_program, Address, Witness};
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Configuration for the consensus engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Time between block production attempts.
    pub block_interval: Duration,

    /// Number of recent blocks checked for duplicate transactions.
    pub replay_window: usize,

    /// Maximum pool transactions per block, excluding the leader transaction.
    pub max_txs_per_block: usize,

    /// Deadline for each ledger or pool request.
    pub request_timeout: Duration,

    /// Size of the engine mailbox.
    pub mailbox_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            block_interval: Duration::from_secs(6),
            replay_window: DEFAULT_REPLAY_WINDOW,
            max_txs_per_block: 1000,
            request_timeout: Duration::from_secs(10),
            mailbox_size: 1024,
        }
    }
}

/// State of the consensus engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Not producing blocks.
    Idle,
    /// Producing a block on every tick.
    Running,
}

/// Snapshot returned by [`EngineHandle::status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStatus {
    /// Current state.
    pub state: EngineState,
    /// Heights covered by the replay window.
    pub replay_range: (u32, u32),
    /// Blocks this engine has produced and the ledger accepted.
    pub blocks_produced: u64,
}

/// Events emitted by the consensus engine.
#[derive(Debug, Clone)]
pub enum ConsensusEvent {
    /// Consensus state changed.
    StateChanged { old: EngineState, new: EngineState },
    /// A block was produced and accepted by the ledger.
    BlockProduced {
        height: u32,
        hash: BlockHash,
        tx_count: usize,
    },
    /// A tick failed; the engine keeps running.
    TickFailed { reason: String },
}

/// Messages handled by the engine.
#[derive(Debug)]
pub enum Message {
    /// Begin producing blocks.
    StartConsensus,
    /// Stop producing blocks.
    StopConsensus,
    /// Produce a block.
    TimerTick,
    /// The ledger committed a block.
    BlockCommitted(Arc<Block>),
    /// Report the current status.
    Status {
        response: oneshot::Sender<EngineStatus>,
    },
    /// Stop and leave the processing loop.
    Shutdown,
}

/// Handle for sending commands to a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    sender: mpsc::Sender<Message>,
    running: Arc<AtomicBool>,
    events: broadcast::Sender<ConsensusEvent>,
}

impl EngineHandle {
    /// Requests block production to start.
    pub async fn start(&self) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        self.send(Message::StartConsensus).await
    }

    /// Requests block production to stop.
    ///
    /// A tick already in flight will not submit its block.
    pub async fn stop(&self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        self.send(Message::StopConsensus).await
    }

    /// Returns the engine status.
    pub async fn status(&self) -> Result<EngineStatus> {
        let (response, rx) = oneshot::channel();
        self.send(Message::Status { response }).await?;
        rx.await.map_err(|_| ConsensusError::EngineStopped)
    }

    /// Stops the engine and ends its processing loop.
    pub async fn shutdown(&self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        self.send(Message::Shutdown).await
    }

    /// Subscribes to engine events.
    pub fn subscribe(&self) -> broadcast::Receiver<ConsensusEvent> {
        self.events.subscribe()
    }

    async fn send(&self, message: Message) -> Result<()> {
        self.sender
            .send(message)
            .await
            .map_err(|_| ConsensusError::EngineStopped)
    }
}

/// Tasks that exist only while the engine is running.
struct RunningTasks {
    timer: JoinHandle<()>,
    subscription: JoinHandle<()>,
}

impl RunningTasks {
    fn abort(self) {
        self.timer.abort();
        self.subscription.abort();
    }
}

/// The solo consensus engine.
pub struct ConsensusEngine {
    config: EngineConfig,
    ledger: LedgerHandle,
    pool: PoolHandle,
    signer: SignerHandle,
    replay: ReplayGuard,
    state: EngineState,
    mailbox: mpsc::Receiver<Message>,
    sender: mpsc::WeakSender<Message>,
    running: Arc<AtomicBool>,
    tick_pending: Arc<AtomicBool>,
    tasks: Option<RunningTasks>,
    events: broadcast::Sender<ConsensusEvent>,
    blocks_produced: u64,
}

impl ConsensusEngine {
    /// Creates an engine and the handle used to drive it.
    pub fn new(
        config: EngineConfig,
        ledger: LedgerHandle,
        pool: PoolHandle,
        signer: SignerHandle,
    ) -> (Self, EngineHandle) {
        let (sender, mailbox) = mpsc::channel(config.mailbox_size.max(1));
        let (events, _) = broadcast::channel(1024);
        let running = Arc::new(AtomicBool::new(false));

        let engine = Self {
            replay: ReplayGuard::new(config.replay_window),
            config,
            ledger,
            pool,
            signer,
            state: EngineState::Idle,
            mailbox,
            sender: sender.downgrade(),
            running: running.clone(),
            tick_pending: Arc::new(AtomicBool::new(false)),
            tasks: None,
            events: events.clone(),
            blocks_produced: 0,
        };
        let handle = EngineHandle {
            sender,
            running,
            events,
        };

        (engine, handle)
    }

    /// Processes messages until shutdown or until every handle is dropped.
    pub async fn run(mut self) {
        info!(
            block_interval = ?self.config.block_interval,
            replay_window = self.replay.max_blocks(),
            "consensus engine ready"
        );

        while let Some(message) = self.mailbox.recv().await {
            match message {
                Message::StartConsensus => self.start_consensus(),
                Message::StopConsensus => self.stop_consensus(),
                Message::TimerTick => self.on_tick().await,
                Message::BlockCommitted(block) => self.on_block_committed(&block),
                Message::Status { response } => {
                    let _ = response.send(self.status());
                }
                Message::Shutdown => break,
            }
        }

        self.stop_consensus();
        info!(blocks_produced = self.blocks_produced, "consensus engine stopped");
    }

    fn status(&self) -> EngineStatus {
        EngineStatus {
            state: self.state,
            replay_range: self.replay.block_range(),
            blocks_produced: self.blocks_produced,
        }
    }

    fn set_state(&mut self, new: EngineState) {
        let old = self.state;
        self.state = new;
        let _ = self.events.send(ConsensusEvent::StateChanged { old, new });
    }

    fn start_consensus(&mut self) {
        if self.state == EngineState::Running {
            warn!("consensus already started");
            return;
        }

        let Some(sender) = self.sender.upgrade() else {
            error!("engine mailbox closed, cannot start");
            return;
        };

        self.tick_pending.store(false, Ordering::SeqCst);
        let mut commits = self.ledger.subscribe();
        let forward = sender.clone();
        let subscription = tokio::spawn(async move {
            loop {
                match commits.recv().await {
                    Ok(block) => {
                        if forward.send(Message::BlockCommitted(block)).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "missed commit notifications");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        let period = self.config.block_interval;
        let tick_pending = self.tick_pending.clone();
        let timer = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                // At most one tick waits in the mailbox.
                if tick_pending.swap(true, Ordering::SeqCst) {
                    continue;
                }
                if sender.send(Message::TimerTick).await.is_err() {
                    break;
                }
            }
        });

        self.tasks = Some(RunningTasks {
            timer,
            subscription,
        });
        self.set_state(EngineState::Running);
        info!("consensus started");
    }

    fn stop_consensus(&mut self) {
        if self.state != EngineState::Running {
            debug!("consensus not running");
            return;
        }

        if let Some(tasks) = self.tasks.take() {
            tasks.abort();
        }
        self.replay.clean();
        self.set_state(EngineState::Idle);
        info!("consensus stopped");
    }

    fn on_block_committed(&mut self, block: &Block) {
        if self.state != EngineState::Running {
            return;
        }
        // The guard reports discontinuities itself; the next tick cleans up.
        if self.replay.add_block(block).is_ok() {
            debug!(
                height = block.height(),
                range = ?self.replay.block_range(),
                "replay window advanced"
            );
        }
    }

    async fn on_tick(&mut self) {
        self.tick_pending.store(false, Ordering::SeqCst);
        if self.state != EngineState::Running {
            debug!("ignoring tick while idle");
            return;
        }

        match self.produce_block().await {
            Ok(Some(block)) => {
                self.blocks_produced += 1;
                let hash = block.hash();
                info!(
                    height = block.height(),
                    block_hash = %hash,
                    tx_count = block.tx_count(),
                    "produced block"
                );
                let _ = self.events.send(ConsensusEvent::BlockProduced {
                    height: block.height(),
                    hash,
                    tx_count: block.tx_count(),
                });
            }
            Ok(None) => {
                info!("consensus stopped during block assembly, block dropped");
            }
            Err(e) => {
                error!(error = %e, "block production failed");
                let _ = self.events.send(ConsensusEvent::TickFailed {
                    reason: e.to_string(),
                });
            }
        }
    }

    async fn request<T>(
        &self,
        what: &'static str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.config.request_timeout, call)
            .await
            .map_err(|_| ConsensusError::Timeout(what.to_string()))?
    }

    /// Builds, signs and submits one block.
    ///
    /// Returns `None` when consensus was stopped before submission.
    async fn produce_block(&mut self) -> Result<Option<Block>> {
        let height = self
            .request("current height", self.ledger.current_height())
            .await?;
        let prev_hash = self
            .request("current block hash", self.ledger.current_block_hash())
            .await?;

        let (start, end) = self.replay.block_range();
        let validation_height = if height + 1 == end {
            start
        } else {
            if !self.replay.is_empty() {
                warn!(
                    height,
                    range = ?(start, end),
                    "replay window not contiguous with chain head, resetting"
                );
            }
            self.replay.clean();
            height
        };

        let candidates = self
            .request("pool candidates", self.pool.candidates(true, validation_height))
            .await?;

        let leader = self.signer.public_key();
        let leader_tx = Transaction::book_keeping(leader, rand::random());
        let witness = self.authorize(leader_tx.id().as_bytes())?;
        let leader_tx = leader_tx.with_witness(witness);

        let mut included = HashSet::new();
        included.insert(leader_tx.id());
        let mut transactions = vec![leader_tx];
        for tx in candidates {
            if transactions.len() > self.config.max_txs_per_block {
                break;
            }
            let id = tx.id();
            if let Err(reason) = self.replay.verify_id(&id, validation_height) {
                debug!(tx_id = %id, %reason, "candidate filtered");
                continue;
            }
            if included.insert(id) {
                transactions.push(tx);
            }
        }

        let next_height = height + 1;
        let tx_root = Block::compute_tx_root(&transactions);
        let state_root = self
            .request(
                "state root",
                self.ledger.state_root_after(next_height, tx_root),
            )
            .await?;

        let mut header = BlockHeader {
            version: BlockHeader::VERSION,
            prev_hash,
            tx_root,
            state_root,
            timestamp: unix_now(),
            height: next_height,
            consensus_data: rand::random(),
            next_bookkeeper: Address::from_public_key(&leader),
            bookkeepers: Vec::new(),
            sig_data: Vec::new(),
            program: Vec::new(),
        };
        let signature = self.signer.sign(header.hash().as_bytes())?;
        header.bookkeepers = vec![leader];
        header.sig_data = vec![signature];
        header.program = encode_single_key_program(&leader);

        let block = Block {
            header,
            transactions,
        };

        if !self.running.load(Ordering::SeqCst) {
            return Ok(None);
        }

        self.request("add block", self.ledger.add_block(block.clone()))
            .await?;
        Ok(Some(block))
    }

    /// Builds the leader's single-key witness over `message`.
    fn authorize(&self, message: &[u8]) -> Result<Witness> {
        let signature = self.signer.sign(message)?;
        Ok(Witness {
            invocation: encode_parameter_program(&[signature.as_bytes()])?,
            verification: encode_single_key_program(&self.signer.public_key()),
        })
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;
    use crate::mempool::Mempool;
    use crate::service::LocalSigner;
    use solo_program::KeyPair;

    fn setup(config: EngineConfig) -> (ConsensusEngine, EngineHandle, Arc<MemoryLedger>) {
        let key = KeyPair::from_seed(1);
        let ledger = Arc::new(MemoryLedger::with_bookkeeper(&key.public_key()));
        let pool = Arc::new(Mempool::with_defaults());
        let signer = Arc::new(LocalSigner::new(key));
        let (engine, handle) = ConsensusEngine::new(config, ledger.clone(), pool, signer);
        (engine, handle, ledger)
    }

    fn fast_config() -> EngineConfig {
        EngineConfig {
            block_interval: Duration::from_millis(100),
            ..Default::default()
        }
    }

    #[test]
    fn test_engine_config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.block_interval, Duration::from_secs(6));
        assert_eq!(config.replay_window, 10);
        assert_eq!(config.max_txs_per_block, 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_starts_idle() {
        let (engine, handle, ledger) = setup(fast_config());
        tokio::spawn(engine.run());

        tokio::time::sleep(Duration::from_secs(1)).await;
        let status = handle.status().await.unwrap();
        assert_eq!(status.state, EngineState::Idle);
        assert_eq!(status.replay_range, (0, 0));
        assert_eq!(ledger.height(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_produces_leader_block() {
        let (engine, handle, ledger) = setup(fast_config());
        let mut events = handle.subscribe();
        tokio::spawn(engine.run());

        handle.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        let block = ledger.block_at(1).unwrap();
        assert_eq!(block.tx_count(), 1);
        assert_eq!(block.transactions[0].kind(), "book_keeping");
        assert!(block.verify_leader_signature().is_ok());

        let status = handle.status().await.unwrap();
        assert_eq!(status.state, EngineState::Running);
        assert_eq!(status.replay_range, (1, 2));
        assert_eq!(status.blocks_produced, 1);

        assert!(matches!(
            events.recv().await.unwrap(),
            ConsensusEvent::StateChanged {
                old: EngineState::Idle,
                new: EngineState::Running
            }
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            ConsensusEvent::BlockProduced {
                height: 1,
                tx_count: 1,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_clears_window_and_halts() {
        let (engine, handle, ledger) = setup(fast_config());
        tokio::spawn(engine.run());

        handle.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(ledger.height(), 2);

        handle.stop().await.unwrap();
        let status = handle.status().await.unwrap();
        assert_eq!(status.state, EngineState::Idle);
        assert_eq!(status.replay_range, (0, 0));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(ledger.height(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_rebuilds_window() {
        let (engine, handle, ledger) = setup(fast_config());
        tokio::spawn(engine.run());

        handle.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        handle.stop().await.unwrap();

        handle.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(ledger.height(), 3);
        assert_eq!(handle.status().await.unwrap().replay_range, (3, 4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_ends_loop() {
        let (engine, handle, _ledger) = setup(fast_config());
        let task = tokio::spawn(engine.run());

        handle.start().await.unwrap();
        handle.shutdown().await.unwrap();
        task.await.unwrap();

        assert!(matches!(
            handle.status().await,
            Err(ConsensusError::EngineStopped)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_ends_when_handles_dropped() {
        let (engine, handle, _ledger) = setup(fast_config());
        let task = tokio::spawn(engine.run());
        drop(handle);
        task.await.unwrap();
    }

    #[test]
    fn test_unix_now_is_recent() {
        assert!(unix_now() > 1_600_000_000);
    }
}
