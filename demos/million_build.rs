use perfhash::{Algorithm, BuildConfig, Builder, LoadFactor};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::collections::HashSet;
use std::error::Error;
use std::time::Instant;

const N_KEYS: usize = 1_000_000;
const GEN_SEED: u64 = 42;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .try_init()?;

    println!("--- perfhash ---");
    println!("n = {N_KEYS}");

    let t0 = Instant::now();
    let keys = gen_unique_keys(N_KEYS, GEN_SEED);
    let gen_s = t0.elapsed().as_secs_f64();
    println!(
        "gen:    {:>8.3} s   ({:.1} M keys/s)",
        gen_s,
        N_KEYS as f64 / gen_s / 1e6
    );

    for (algorithm, load_factor) in [
        (Algorithm::Bdz, LoadFactor::Fixed(1.25)),
        (Algorithm::Chm3, LoadFactor::Minimum),
        (Algorithm::Chm, LoadFactor::Fixed(2.1)),
    ] {
        let cfg = BuildConfig {
            algorithm,
            load_factor,
            ..Default::default()
        };

        let t1 = Instant::now();
        let mph = Builder::new().with_config(cfg).build(&keys)?;
        let build_s = t1.elapsed().as_secs_f64();
        println!(
            "{algorithm:?} build:  {:>8.3} s   ({:.1} M keys/s, {} attempts, c = {:.3})",
            build_s,
            N_KEYS as f64 / build_s / 1e6,
            mph.attempts(),
            mph.load_factor()
        );

        // xor-fold so the loop is not optimized away
        let t2 = Instant::now();
        let mut acc: u32 = 0;
        for chunk in keys.chunks(32_768) {
            for k in chunk {
                acc ^= mph.index(k);
            }
        }
        let lookup_s = t2.elapsed().as_secs_f64();
        println!(
            "{algorithm:?} lookup: {:>8.3} s   ({:.1} M lookups/s)   (acc={acc})",
            lookup_s,
            N_KEYS as f64 / lookup_s / 1e6
        );

        #[cfg(feature = "serde")]
        println!("{algorithm:?} size:   {} bytes", mph.to_bytes()?.len());
    }

    Ok(())
}

/// N unique 16-byte keys, deterministically.
fn gen_unique_keys(n: usize, seed: u64) -> Vec<Vec<u8>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut set = HashSet::with_capacity(n * 2);
    let mut keys = Vec::with_capacity(n);
    while keys.len() < n {
        let mut buf = [0u8; 16];
        rng.fill_bytes(&mut buf);
        if set.insert(buf) {
            keys.push(buf.to_vec());
        }
    }
    keys
}
