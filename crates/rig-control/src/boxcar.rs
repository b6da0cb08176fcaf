//! 定长滑动窗口（boxcar 平均）

use std::collections::VecDeque;

/// 定长样本窗口
///
/// 满窗之前不给出平均值：收敛判定必须建立在整窗数据上，
/// 否则前几个样本就可能误报到达目标。
#[derive(Debug, Clone)]
pub struct BoxcarWindow {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl BoxcarWindow {
    /// `capacity` 为 0 视为 1（空窗无意义）
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// 推入一个样本，窗口满时挤掉最旧的
    pub fn push(&mut self, sample: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// 整窗平均；未满窗返回 `None`
    pub fn mean(&self) -> Option<f64> {
        if self.is_full() {
            Some(self.samples.iter().sum::<f64>() / self.capacity as f64)
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_mean_until_full() {
        let mut window = BoxcarWindow::new(3);
        assert_eq!(window.mean(), None);
        window.push(1.0);
        window.push(2.0);
        assert_eq!(window.mean(), None);
        window.push(3.0);
        assert_eq!(window.mean(), Some(2.0));
    }

    #[test]
    fn test_sliding_evicts_oldest() {
        let mut window = BoxcarWindow::new(3);
        for v in [1.0, 2.0, 3.0, 4.0] {
            window.push(v);
        }
        // 1.0 被挤出，窗口是 [2, 3, 4]
        assert_eq!(window.mean(), Some(3.0));
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn test_clear_resets_to_warming_up() {
        let mut window = BoxcarWindow::new(2);
        window.push(5.0);
        window.push(5.0);
        assert!(window.is_full());
        window.clear();
        assert!(window.is_empty());
        assert_eq!(window.mean(), None);
    }

    #[test]
    fn test_zero_capacity_clamped_to_one() {
        let mut window = BoxcarWindow::new(0);
        window.push(7.0);
        assert_eq!(window.mean(), Some(7.0));
    }
}
