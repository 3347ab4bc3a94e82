use indexmap::IndexMap;
use std::fmt::{Debug, Formatter};
use std::hash::Hash;
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

/// Declare a new strongly typed arena key.
#[macro_export]
macro_rules! new_index_type {
    ($vis:vis $name:ident) => {
        #[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
        $vis struct $name($crate::util::arena::Idx);

        const _: () = {
            use $crate::util::arena::IndexType;
            use $crate::util::arena::Idx;

            impl IndexType for $name {
                fn new(idx: Idx) -> Self {
                    Self(idx)
                }
                fn inner(&self) -> Idx {
                    self.0
                }
            }

            impl std::fmt::Debug for $name {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    write!(f, "<{} {}>", stringify!($name), self.0.index())
                }
            }
        };
    };
}

pub trait IndexType: Sized + Debug + Copy + Eq + Hash {
    fn new(idx: Idx) -> Self;
    fn inner(&self) -> Idx;
}

/// Raw arena key. The check value ties a key to the arena that created it.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Idx {
    index: usize,
    check: u64,
}

impl Idx {
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Append-only storage, values are never removed or moved once pushed.
pub struct Arena<K: IndexType, T> {
    values: Vec<T>,
    check: u64,
    ph: PhantomData<K>,
}

impl<K: IndexType, T> Arena<K, T> {
    pub fn push(&mut self, value: T) -> K {
        let key = K::new(Idx {
            index: self.values.len(),
            check: self.check,
        });
        self.values.push(value);
        key
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &T)> + '_ {
        let check = self.check;
        self.values
            .iter()
            .enumerate()
            .map(move |(index, value)| (K::new(Idx { index, check }), value))
    }

    pub fn keys(&self) -> impl Iterator<Item = K> + '_ {
        self.iter().map(|(k, _)| k)
    }

    pub fn contains(&self, key: K) -> bool {
        key.inner().check == self.check && key.inner().index < self.values.len()
    }

    fn check_key(&self, key: K) -> usize {
        assert_eq!(
            self.check,
            key.inner().check,
            "Arena key {:?} used in arena which did not create it",
            key
        );
        key.inner().index
    }
}

impl<K: IndexType, T> Index<K> for Arena<K, T> {
    type Output = T;
    fn index(&self, index: K) -> &Self::Output {
        &self.values[self.check_key(index)]
    }
}

impl<K: IndexType, T> IndexMut<K> for Arena<K, T> {
    fn index_mut(&mut self, index: K) -> &mut Self::Output {
        let index = self.check_key(index);
        &mut self.values[index]
    }
}

impl<K: IndexType, T> Default for Arena<K, T> {
    fn default() -> Self {
        Self {
            values: vec![],
            check: rand::random(),
            ph: PhantomData,
        }
    }
}

impl<K: IndexType, T: Debug> Debug for Arena<K, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let map: IndexMap<_, _> = self.iter().collect();
        map.fmt(f)
    }
}
