use alloc::vec::Vec;

/// 容量固定的槽位数组，空槽位的索引保存在栈中，插入与移除均为O(1)。
#[derive(Debug, Clone)]
pub struct SlotVec<T> {
    slots: Vec<Option<T>>,
    free: Vec<usize>,
}

impl<T> SlotVec<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        // 倒序入栈，使小索引先被取出
        let free = (0..capacity).rev().collect();
        Self { slots, free }
    }

    /// 插入新元素至空槽位，并返回槽位的索引；已满时返回`None`。
    pub fn insert(&mut self, element: T) -> Option<usize> {
        let index = self.free.pop()?;
        self.slots[index] = Some(element);
        Some(index)
    }

    pub fn remove(&mut self, index: usize) -> Option<T> {
        let element = self.slots.get_mut(index)?.take()?;
        self.free.push(index);
        Some(element)
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index)?.as_ref()
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slots.get_mut(index)?.as_mut()
    }

    /// 已占用的槽位数
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.free.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|e| (i, e)))
    }

    /// 已占用槽位的索引
    pub fn indices(&self) -> Vec<usize> {
        self.iter().map(|(i, _)| i).collect()
    }
}
