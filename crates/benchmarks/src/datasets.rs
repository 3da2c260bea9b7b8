use rand::{distributions::Alphanumeric, rngs::StdRng, Rng, SeedableRng};

const TOP_LEVEL: [&str; 4] = ["reports", "projects", "archive", "shared"];
const EXTENSIONS: [&str; 4] = ["md", "txt", "csv", "json"];
const CONTENT_SENTENCE: &str =
    "Quarterly numbers were reviewed and the follow-up items were assigned.";

/// A synthetic document: absolute path plus body.
#[derive(Clone, Debug)]
pub struct Document {
    pub path: String,
    pub content: String,
}

/// Deterministic folder layout up to `max_depth` levels below the top-level
/// folders, with `count` documents spread over it.
pub fn generate_documents(count: usize, max_depth: usize, seed: u64) -> Vec<Document> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|idx| {
            let mut segments = vec![TOP_LEVEL[rng.gen_range(0..TOP_LEVEL.len())].to_string()];
            let depth = rng.gen_range(0..=max_depth);
            for level in 0..depth {
                segments.push(format!("d{level}-{}", rng.gen_range(0..4)));
            }
            let ext = EXTENSIONS[idx % EXTENSIONS.len()];
            segments.push(format!("doc-{idx:05}.{ext}"));
            Document {
                path: format!("/{}", segments.join("/")),
                content: format!("{CONTENT_SENTENCE}\n{}", random_suffix(&mut rng)),
            }
        })
        .collect()
}

fn random_suffix(rng: &mut StdRng) -> String {
    (0..32).map(|_| rng.sample(Alphanumeric) as char).collect()
}
