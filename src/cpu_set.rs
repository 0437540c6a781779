use std::fmt;
use std::mem::size_of;

const WORD_BITS: usize = usize::BITS as usize;

/// A variable-length set of CPU ids.
///
/// Bit `i` corresponds to the CPU the operating system identifies as `i`. The backing storage
/// is a slice of machine words laid out the way the kernel lays out an affinity mask, so the
/// set can be handed to the native affinity calls as-is.
#[derive(Clone, PartialEq, Eq)]
pub struct CpuSet {
    words: Box<[usize]>,
}

impl CpuSet {
    /// Create an empty set able to hold CPU ids `0..capacity`.
    ///
    /// The capacity is rounded up to a whole number of words.
    pub fn with_capacity(capacity: usize) -> Self {
        let len = capacity.div_ceil(WORD_BITS).max(1);
        Self {
            words: vec![0; len].into_boxed_slice(),
        }
    }

    /// Create a set of the given capacity holding exactly `cpus`.
    ///
    /// Ids at or beyond the capacity are ignored.
    pub fn from_cpus(capacity: usize, cpus: impl IntoIterator<Item = usize>) -> Self {
        let mut set = Self::with_capacity(capacity);
        for cpu in cpus {
            set.insert(cpu);
        }
        set
    }

    /// Number of CPU ids this set can represent.
    pub fn capacity(&self) -> usize {
        self.words.len() * WORD_BITS
    }

    /// Size of the set in bytes, as passed to the native calls.
    pub fn byte_size(&self) -> usize {
        self.words.len() * size_of::<usize>()
    }

    /// Add `cpu` to the set. Returns `false` if it does not fit.
    pub fn insert(&mut self, cpu: usize) -> bool {
        match self.words.get_mut(cpu / WORD_BITS) {
            Some(word) => {
                *word |= 1usize << (cpu % WORD_BITS);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, cpu: usize) -> bool {
        self.words
            .get(cpu / WORD_BITS)
            .is_some_and(|word| word & (1usize << (cpu % WORD_BITS)) != 0)
    }

    pub fn clear(&mut self) {
        self.words.fill(0);
    }

    pub fn count(&self) -> usize {
        self.words.iter().map(|word| word.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&word| word == 0)
    }

    /// Lowest CPU id in the set.
    pub fn first(&self) -> Option<usize> {
        self.words
            .iter()
            .enumerate()
            .find(|&(_, &word)| word != 0)
            .map(|(index, word)| index * WORD_BITS + word.trailing_zeros() as usize)
    }

    /// CPU ids in the set, ascending.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(index, &word)| {
            let mut remaining = word;
            std::iter::from_fn(move || {
                if remaining == 0 {
                    return None;
                }
                let bit = remaining.trailing_zeros() as usize;
                remaining &= remaining - 1;
                Some(index * WORD_BITS + bit)
            })
        })
    }

    #[cfg_attr(not(any(target_os = "linux", target_os = "android")), allow(dead_code))]
    pub(crate) fn words(&self) -> &[usize] {
        &self.words
    }

    #[cfg_attr(not(any(target_os = "linux", target_os = "android")), allow(dead_code))]
    pub(crate) fn words_mut(&mut self) -> &mut [usize] {
        &mut self.words
    }
}

impl fmt::Debug for CpuSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CpuSet")
            .field("capacity", &self.capacity())
            .field("cpus", &self.iter().collect::<Vec<_>>())
            .finish()
    }
}
