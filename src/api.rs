use std::{sync::Arc, thread::JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};

use crate::store::MetadataStore;

/// 供展示层使用的播放器图标资源定位符。纯配置，不参与任何核心逻辑。
pub const PLAYER_ICON_RESOURCE: &str = "resources/foobar2000.ico";

/// 当前播放曲目的元数据。
///
/// 三个字段同时为空表示“没有在播放”。
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackMetadata {
    /// 曲目标题。
    pub title: String,
    /// 艺术家名称。
    pub artist: String,
    /// 专辑标题。
    pub album: String,
}

impl TrackMetadata {
    /// 三个字段是否都为空。
    pub fn is_empty(&self) -> bool {
        self.title.is_empty() && self.artist.is_empty() && self.album.is_empty()
    }

    /// 返回与 `other` 相比值不同的字段，顺序固定为标题、艺术家、专辑。
    pub fn changed_fields(&self, other: &Self) -> Vec<MetadataField> {
        MetadataField::ALL
            .into_iter()
            .filter(|field| field.get(self) != field.get(other))
            .collect()
    }
}

/// `TrackMetadata` 中可单独通知变化的字段。
///
/// 变化通知只携带字段名，订阅者需要自行从 [`MetadataStore::current`] 读取新值。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetadataField {
    /// 标题。
    Title,
    /// 艺术家。
    Artist,
    /// 专辑。
    Album,
}

impl MetadataField {
    /// 所有字段，按通知顺序排列。
    pub const ALL: [MetadataField; 3] = [Self::Title, Self::Artist, Self::Album];

    /// 从元数据中取出该字段的值。
    pub fn get(self, metadata: &TrackMetadata) -> &str {
        match self {
            MetadataField::Title => &metadata.title,
            MetadataField::Artist => &metadata.artist,
            MetadataField::Album => &metadata.album,
        }
    }

    /// 字段名，与展示层绑定时使用的属性名一致。
    pub fn name(self) -> &'static str {
        match self {
            MetadataField::Title => "SongTitle",
            MetadataField::Artist => "SongArtist",
            MetadataField::Album => "SongAlbum",
        }
    }
}

/// 轮询循环的两个状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum PlayerState {
    #[default]
    /// 没有在播放，或者标题无法识别。
    Idle,
    /// 正在播放一首曲目。
    Playing,
}

impl From<&TrackMetadata> for PlayerState {
    fn from(metadata: &TrackMetadata) -> Self {
        if metadata.is_empty() {
            PlayerState::Idle
        } else {
            PlayerState::Playing
        }
    }
}

/// 后台轮询线程结束的原因。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// 被守护的播放器进程已退出。这是设计上的终止路径，宿主随之退出。
    ProcessLost,
    /// 使用者通过 [`NowPlayingController::shutdown`] 主动取消。
    Cancelled,
}

/// 与后台服务交互的控制器。
///
/// 丢弃控制器时会向后台线程发送取消信号，但不会关闭播放器。
pub struct NowPlayingController {
    pub(crate) store: Arc<MetadataStore>,
    pub(crate) cancel_tx: Option<Sender<()>>,
    pub(crate) worker_handle: Option<JoinHandle<ShutdownReason>>,
}

impl NowPlayingController {
    /// 共享的元数据存储。
    pub fn store(&self) -> &Arc<MetadataStore> {
        &self.store
    }

    /// 当前元数据的一致快照。
    pub fn current(&self) -> TrackMetadata {
        self.store.current()
    }

    /// 订阅字段级的变化通知。
    pub fn subscribe(&self) -> Receiver<MetadataField> {
        self.store.subscribe()
    }

    /// 根据最近一次发布的元数据推断当前状态。
    pub fn player_state(&self) -> PlayerState {
        PlayerState::from(&self.store.current())
    }

    /// 播放器图标资源定位符。
    pub fn icon_resource(&self) -> &'static str {
        PLAYER_ICON_RESOURCE
    }

    /// 后台轮询线程是否已经结束。
    pub fn is_finished(&self) -> bool {
        self.worker_handle
            .as_ref()
            .is_none_or(|handle| handle.is_finished())
    }

    /// 停止后台轮询线程并等待其退出，返回线程结束的原因。
    ///
    /// 如果播放器已经先一步退出，返回 [`ShutdownReason::ProcessLost`]。
    pub fn shutdown(mut self) -> Option<ShutdownReason> {
        self.stop_worker()
    }

    fn stop_worker(&mut self) -> Option<ShutdownReason> {
        if let Some(tx) = self.cancel_tx.take() {
            log::debug!("[NowPlayingController] 正在向轮询线程发送取消信号...");
            // 线程可能已经自行退出，发送失败无需处理
            let _ = tx.send(());
        }

        let handle = self.worker_handle.take()?;
        match handle.join() {
            Ok(reason) => {
                log::debug!("[NowPlayingController] 轮询线程已退出: {reason:?}");
                Some(reason)
            }
            Err(e) => {
                log::warn!("[NowPlayingController] 等待轮询线程退出失败: {e:?}");
                None
            }
        }
    }
}

impl Drop for NowPlayingController {
    fn drop(&mut self) {
        if self.worker_handle.is_some() {
            log::trace!("[NowPlayingController] 控制器被丢弃，正在停止轮询线程...");
            self.stop_worker();
        }
    }
}
