use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, RwLock};

use crate::api::{MetadataField, TrackMetadata};

/// 保存最近一次发布的曲目元数据，并向订阅者广播字段级的变化通知。
///
/// 三个字段作为一个整体放在同一把读写锁后面替换，读者拿到的快照不会混合两次更新。
/// 通知在释放锁之后才发送，订阅者在回调中再次读取 `current()` 不会死锁。
#[derive(Debug, Default)]
pub struct MetadataStore {
    current: RwLock<TrackMetadata>,
    subscribers: Mutex<Vec<Sender<MetadataField>>>,
}

impl MetadataStore {
    /// 创建一个空的存储。
    pub fn new() -> Self {
        Self::default()
    }

    /// 返回当前元数据的一致快照。
    pub fn current(&self) -> TrackMetadata {
        self.current.read().clone()
    }

    /// 订阅变化通知。每个值发生变化的字段对应一条消息。
    pub fn subscribe(&self) -> Receiver<MetadataField> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// 替换整组元数据，并为每个值实际变化的字段发送一条通知。
    ///
    /// 与当前值相同的更新不会产生任何通知。返回发生变化的字段。
    pub fn update(&self, metadata: TrackMetadata) -> Vec<MetadataField> {
        let changed = {
            let mut current = self.current.write();
            let changed = metadata.changed_fields(&current);
            if !changed.is_empty() {
                *current = metadata;
            }
            changed
        };

        if changed.is_empty() {
            return changed;
        }

        log::trace!("[MetadataStore] 字段已变化: {changed:?}");
        self.notify(&changed);
        changed
    }

    fn notify(&self, fields: &[MetadataField]) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| {
            let alive = fields.iter().all(|field| tx.send(*field).is_ok());
            if !alive {
                log::debug!("[MetadataStore] 订阅者已断开，已移除。");
            }
            alive
        });
    }
}
