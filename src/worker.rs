use std::{sync::Arc, thread, time::Duration};

use crossbeam_channel::{Receiver, select};

use crate::{
    api::{PlayerState, ShutdownReason},
    error::{NowPlayingError, Result},
    platform::{PlayerHost, PlayerProcess},
    store::MetadataStore,
    supervisor::{self, ProcessSupervisor, ReadyWait},
    title_parser::{ParsedTitle, TitleParser},
};

/// `PollingWorker` 在一个专用的后台线程中运行，负责：
/// 1.  **就绪等待**: 启动后先等待播放器界面初始化完成。
/// 2.  **定时采样**: 每隔固定间隔读取一次窗口标题，两次采样之间一定会休眠。
/// 3.  **状态机**: 根据解析结果在 `Idle` 和 `Playing` 之间切换。
/// 4.  **发布**: 只有当解析结果与存储中的值不同时才会产生变化通知。
pub(crate) struct PollingWorker<H: PlayerHost> {
    supervisor: ProcessSupervisor<H>,
    process: H::Process,
    parser: TitleParser,
    store: Arc<MetadataStore>,
    interval: Duration,
    /// 使用者发出的取消信号。
    cancel_rx: Receiver<()>,
    /// 退出回调发出的进程退出信号。
    exit_rx: Receiver<()>,
    state: PlayerState,
}

impl<H: PlayerHost> PollingWorker<H> {
    pub(crate) fn new(
        supervisor: ProcessSupervisor<H>,
        process: H::Process,
        store: Arc<MetadataStore>,
        cancel_rx: Receiver<()>,
        exit_rx: Receiver<()>,
    ) -> Self {
        let parser = TitleParser::new(&supervisor.config().app_marker);
        let interval = supervisor.config().poll_interval();
        Self {
            supervisor,
            process,
            parser,
            store,
            interval,
            cancel_rx,
            exit_rx,
            state: PlayerState::Idle,
        }
    }

    /// 轮询线程的入口点。在进程退出或收到取消信号之前不会返回。
    pub(crate) fn run(mut self) -> ShutdownReason {
        log::info!("[PollingWorker] 轮询线程已启动，间隔 {:?}。", self.interval);
        let reason = match self.supervisor.await_input_ready(&self.process, &self.cancel_rx) {
            ReadyWait::Cancelled => ShutdownReason::Cancelled,
            ReadyWait::ProcessExited => ShutdownReason::ProcessLost,
            ReadyWait::Ready | ReadyWait::TimedOut => self.poll_until_stopped(),
        };

        match reason {
            ShutdownReason::ProcessLost => self.supervisor.on_process_lost(),
            // 使用者主动停止，之后播放器再退出也不终止宿主
            ShutdownReason::Cancelled => self.supervisor.disarm(),
        }
        log::info!("[PollingWorker] 轮询线程已结束: {reason:?}");
        reason
    }

    fn poll_until_stopped(&mut self) -> ShutdownReason {
        loop {
            if let Some(reason) = self.wait_for_next_tick() {
                return reason;
            }
            if self.process.has_exited() {
                log::info!("[PollingWorker] 检测到播放器进程已退出。");
                return ShutdownReason::ProcessLost;
            }
            self.tick();
        }
    }

    /// 等待一个轮询间隔。期间收到取消或退出信号则返回结束原因。
    fn wait_for_next_tick(&mut self) -> Option<ShutdownReason> {
        let mut exit_channel_closed = false;
        let outcome = select! {
            // 发送端被丢弃同样视为取消
            recv(self.cancel_rx) -> _ => {
                log::debug!("[PollingWorker] 收到取消信号。");
                Some(ShutdownReason::Cancelled)
            }
            recv(self.exit_rx) -> msg => match msg {
                Ok(()) => Some(ShutdownReason::ProcessLost),
                Err(_) => {
                    exit_channel_closed = true;
                    None
                }
            },
            default(self.interval) => None,
        };

        if exit_channel_closed {
            // 退出回调被丢弃而未调用，退出只能靠每次采样前的检查发现
            log::debug!("[PollingWorker] 退出通知通道已断开，改为仅依赖主动检查。");
            self.exit_rx = crossbeam_channel::never();
        }
        outcome
    }

    /// 执行一次采样、解析与发布。
    fn tick(&mut self) {
        let raw_title = self.process.window_title();
        let parsed = self.parser.parse(&raw_title);

        if let ParsedTitle::Malformed { segments } = parsed {
            log::debug!(
                "[PollingWorker] 无法识别的标题 ({segments} 段)，按空闲处理: '{raw_title}'"
            );
        }

        let next_state = if parsed.is_playing() {
            PlayerState::Playing
        } else {
            PlayerState::Idle
        };
        if next_state != self.state {
            log::debug!("[PollingWorker] 状态变化: {:?} -> {next_state:?}", self.state);
            self.state = next_state;
        }

        let metadata = parsed.into_metadata();
        let changed = self.store.update(metadata);
        if !changed.is_empty() && self.state == PlayerState::Playing {
            let current = self.store.current();
            log::info!(
                "[PollingWorker] 新曲目信息: '{}' - '{}' ({})",
                current.artist,
                current.title,
                current.album
            );
        }
    }
}

/// 启动轮询后台线程。
///
/// # 返回
/// - `Ok(JoinHandle)`: 成功启动后，返回线程的句柄，线程的返回值是结束原因。
/// - `Err(NowPlayingError)`: 如果创建线程失败。此时退出回调已被解除，播放器退出不会终止宿主。
pub(crate) fn start_polling_thread<H: PlayerHost>(
    worker: PollingWorker<H>,
) -> Result<thread::JoinHandle<ShutdownReason>> {
    let disarm_flag = worker.supervisor.disarm_flag();
    thread::Builder::new()
        .name("now_playing_poller".to_string())
        .spawn(move || worker.run())
        .map_err(|e| {
            log::error!("[PollingWorker] 无法创建轮询线程: {e}");
            supervisor::disarm(&disarm_flag);
            NowPlayingError::WorkerThread(e.to_string())
        })
}
