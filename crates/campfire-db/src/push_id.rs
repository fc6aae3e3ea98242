use std::sync::Mutex;

use rand::Rng;

/// Alphabet in ASCII order, so byte-wise comparison of keys matches the
/// numeric order of what they encode.
const PUSH_CHARS: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

const TIME_CHARS: usize = 8;
const RANDOM_CHARS: usize = 12;

/// Generates 20-character push keys: 8 characters of millisecond timestamp
/// followed by 12 random characters. Keys from one generator sort in the
/// order they were issued, even within a single millisecond.
pub struct PushIds {
    state: Mutex<PushState>,
}

struct PushState {
    last_ms: i64,
    last_rand: [u8; RANDOM_CHARS],
}

impl PushIds {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PushState {
                last_ms: i64::MIN,
                last_rand: [0; RANDOM_CHARS],
            }),
        }
    }

    pub fn next(&self) -> String {
        self.next_at(chrono::Utc::now().timestamp_millis())
    }

    fn next_at(&self, now_ms: i64) -> String {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        if now_ms > state.last_ms {
            state.last_ms = now_ms;
            let mut rng = rand::rng();
            for slot in state.last_rand.iter_mut() {
                *slot = rng.random_range(0..64);
            }
        } else if !increment(&mut state.last_rand) {
            // Suffix space for this millisecond is exhausted; borrow the next one.
            state.last_ms += 1;
            state.last_rand = [0; RANDOM_CHARS];
        }

        encode(state.last_ms, &state.last_rand)
    }
}

impl Default for PushIds {
    fn default() -> Self {
        Self::new()
    }
}

/// Add one to the base-64 suffix. Returns false on overflow.
fn increment(digits: &mut [u8; RANDOM_CHARS]) -> bool {
    for d in digits.iter_mut().rev() {
        if *d < 63 {
            *d += 1;
            return true;
        }
        *d = 0;
    }
    false
}

fn encode(ms: i64, suffix: &[u8; RANDOM_CHARS]) -> String {
    let mut out = [0u8; TIME_CHARS + RANDOM_CHARS];
    let mut ts = ms.max(0) as u64;
    for i in (0..TIME_CHARS).rev() {
        out[i] = PUSH_CHARS[(ts % 64) as usize];
        ts /= 64;
    }
    for (i, d) in suffix.iter().enumerate() {
        out[TIME_CHARS + i] = PUSH_CHARS[*d as usize];
    }
    out.iter().map(|&b| b as char).collect()
}
