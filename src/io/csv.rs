/*!
# Saving Comparison Results and Chains to CSV

Enable via the `csv` feature.
*/

use std::fs::File;
use std::path::Path;

use csv::Writer;
use ndarray::{ArrayView2, Axis};

use crate::compare::ComparisonResult;
use crate::error::Result;

const RESULT_HEADER: [&str; 6] = [
    "method",
    "target",
    "acceptance_rate",
    "min_ess",
    "mean_ess",
    "ess_per_sec",
];

/**
Saves comparison rows as a CSV file.

The header row is `method,target,acceptance_rate,min_ess,mean_ess,ess_per_sec`,
followed by one line per result in the given order.

# Examples

```rust
use tuned_mcmc::compare::ComparisonResult;
use tuned_mcmc::io::csv::save_comparison_csv;

let row = ComparisonResult {
    method: "RWMH".into(),
    target: "banana".into(),
    acceptance_rate: 0.3,
    min_ess: 410.0,
    mean_ess: 455.5,
    ess_per_sec: 9100.0,
};
save_comparison_csv(&[row], "/tmp/comparison.csv")?;
# Ok::<(), tuned_mcmc::Error>(())
```
*/
pub fn save_comparison_csv<P: AsRef<Path>>(
    results: &[ComparisonResult],
    filename: P,
) -> Result<()> {
    let mut wtr = Writer::from_writer(File::create(filename)?);
    wtr.write_record(RESULT_HEADER)?;
    for result in results {
        wtr.write_record([
            result.method.clone(),
            result.target.clone(),
            result.acceptance_rate.to_string(),
            result.min_ess.to_string(),
            result.mean_ess.to_string(),
            result.ess_per_sec.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/**
Saves an `n × d` chain as a CSV file.

The header row is `sample,dim_0,dim_1,...`; each following line holds one row of
the chain prefixed with its index.
*/
pub fn save_chain_csv<P: AsRef<Path>>(samples: ArrayView2<f64>, filename: P) -> Result<()> {
    let mut wtr = Writer::from_writer(File::create(filename)?);

    let mut header = vec!["sample".to_string()];
    header.extend((0..samples.ncols()).map(|i| format!("dim_{i}")));
    wtr.write_record(&header)?;

    for (sample_idx, sample) in samples.axis_iter(Axis(0)).enumerate() {
        let mut row = vec![sample_idx.to_string()];
        row.extend(sample.iter().map(|v| v.to_string()));
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(())
}
