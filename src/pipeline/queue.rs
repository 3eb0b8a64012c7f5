// 该文件是 Yuedong （悦动） 项目的一部分。
// src/pipeline/queue.rs - 带背压策略的有界队列
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::time::Duration;

use crossbeam_channel::{Receiver, SendTimeoutError, Sender, TrySendError, bounded};

use crate::{config::DropPolicy, pipeline::StopToken};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
  /// 已入队，同时挤掉了 `evicted` 个最早的元素
  Delivered { evicted: u64 },
  /// 强制停止，元素未入队
  Stopped,
  /// 下游已退出，元素未入队
  Disconnected,
}

/// 有界队列的生产端
pub struct QueueProducer<T> {
  tx: Sender<T>,
  /// 丢旧帧策略下用来挤掉最早元素的接收端
  evict: Option<Receiver<T>>,
  poll: Duration,
}

/// 创建容量为 `capacity` 的队列
pub fn bounded_queue<T>(
  capacity: usize,
  policy: DropPolicy,
  poll: Duration,
) -> (QueueProducer<T>, Receiver<T>) {
  let (tx, rx) = bounded(capacity);
  let evict = match policy {
    DropPolicy::DropOldest => Some(rx.clone()),
    DropPolicy::Block => None,
  };
  (QueueProducer { tx, evict, poll }, rx)
}

impl<T> QueueProducer<T> {
  pub fn policy(&self) -> DropPolicy {
    match self.evict {
      Some(_) => DropPolicy::DropOldest,
      None => DropPolicy::Block,
    }
  }

  pub fn len(&self) -> usize {
    self.tx.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tx.is_empty()
  }

  /// 入队。阻塞策略下等待空位，期间观察停止信号
  pub fn push(&self, item: T, stop: &StopToken) -> PushOutcome {
    match &self.evict {
      Some(evict) => {
        let mut item = item;
        let mut evicted = 0;
        loop {
          match self.tx.try_send(item) {
            Ok(()) => return PushOutcome::Delivered { evicted },
            Err(TrySendError::Full(back)) => {
              item = back;
              if evict.try_recv().is_ok() {
                evicted += 1;
              }
            }
            Err(TrySendError::Disconnected(_)) => return PushOutcome::Disconnected,
          }
        }
      }
      None => {
        let mut item = item;
        loop {
          match self.tx.send_timeout(item, self.poll) {
            Ok(()) => return PushOutcome::Delivered { evicted: 0 },
            Err(SendTimeoutError::Timeout(back)) => {
              if stop.is_aborted() {
                return PushOutcome::Stopped;
              }
              item = back;
            }
            Err(SendTimeoutError::Disconnected(_)) => return PushOutcome::Disconnected,
          }
        }
      }
    }
  }
}
