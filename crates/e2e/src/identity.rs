//! Synthetic identities for registration flows
//!
//! Every scenario registers a brand new account on the server under test, so
//! usernames carry a random 8-digit suffix to keep parallel runs (and repeated
//! runs against the same data store) from colliding. Generation is a pure
//! function of the random source handed in; seed it to reproduce a run.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Number of random digits appended to the username prefix.
pub const USERNAME_SUFFIX_DIGITS: usize = 8;

const USERNAME_SUFFIX_SPACE: u32 = 100_000_000;

const FIRST_NAMES: &[&str] = &[
    "Ada", "Alan", "Barbara", "Brian", "Carmen", "Dennis", "Edsger", "Frances", "Grace", "Hedy",
    "Ivan", "Joan", "Ken", "Leslie", "Margaret", "Niklaus", "Radia", "Sophie", "Tim", "Yukihiro",
];

const LAST_NAMES: &[&str] = &[
    "Allen", "Backus", "Conway", "Dijkstra", "Engelbart", "Floyd", "Goldberg", "Hamilton",
    "Hopper", "Kernighan", "Lamport", "Liskov", "Lovelace", "Perlman", "Ritchie", "Stroustrup",
    "Thompson", "Torvalds", "Turing", "Wirth",
];

const EMAIL_DOMAINS: &[&str] = &["example.com", "example.org", "example.net"];

/// A throwaway set of registration fields, valid for one scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntheticIdentity {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

impl SyntheticIdentity {
    /// Replace `{{field}}` placeholders with this identity's values.
    pub fn expand(&self, template: &str) -> String {
        template
            .replace("{{username}}", &self.username)
            .replace("{{email}}", &self.email)
            .replace("{{first_name}}", &self.first_name)
            .replace("{{last_name}}", &self.last_name)
            .replace("{{password}}", &self.password)
    }
}

fn pick<R: Rng + ?Sized>(rng: &mut R, pool: &[&'static str]) -> &'static str {
    pool[rng.gen_range(0..pool.len())]
}

fn random_email<R: Rng + ?Sized>(rng: &mut R, first_name: &str, last_name: &str) -> String {
    format!(
        "{}.{}{}@{}",
        first_name.to_lowercase(),
        last_name.to_lowercase(),
        rng.gen_range(10..100_000),
        pick(rng, EMAIL_DOMAINS)
    )
}

/// Passwords always carry upper, lower, digit and symbol characters.
fn random_password<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("SecurePass{:04}!", rng.gen_range(0..10_000))
}

/// Build a fresh identity whose username is `prefix` plus 8 random digits.
pub fn generate_identity<R: Rng + ?Sized>(rng: &mut R, prefix: &str) -> SyntheticIdentity {
    let suffix = rng.gen_range(0..USERNAME_SUFFIX_SPACE);
    let first_name = pick(rng, FIRST_NAMES);
    let last_name = pick(rng, LAST_NAMES);

    SyntheticIdentity {
        username: format!("{prefix}{suffix:0width$}", width = USERNAME_SUFFIX_DIGITS),
        email: random_email(rng, first_name, last_name),
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        password: random_password(rng),
    }
}

/// Owns a seedable random source and hands out identities from it.
#[derive(Debug, Clone)]
pub struct IdentityGenerator {
    rng: StdRng,
}

impl IdentityGenerator {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn generate(&mut self, prefix: &str) -> SyntheticIdentity {
        generate_identity(&mut self.rng, prefix)
    }

    /// Same username, every other field regenerated.
    pub fn sibling(&mut self, identity: &SyntheticIdentity) -> SyntheticIdentity {
        let first_name = pick(&mut self.rng, FIRST_NAMES);
        let last_name = pick(&mut self.rng, LAST_NAMES);

        SyntheticIdentity {
            username: identity.username.clone(),
            email: random_email(&mut self.rng, first_name, last_name),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            password: random_password(&mut self.rng),
        }
    }
}
