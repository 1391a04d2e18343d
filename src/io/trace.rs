//! Persist / reload the full posterior sample as `change_point_trace.nc`.
//!
//! Layout (NetCDF classic):
//!
//! - dimensions `chain`, `draw`
//! - coordinate variables `chain(chain)`, `draw(draw)`
//! - one `(chain, draw)` variable per parameter: breakpoints as `int`,
//!   regime means and scales as `double`
//! - global attributes describing the run

use std::fs;
use std::path::Path;

use log::info;
use nalgebra::DMatrix;

use crate::domain::SamplerConfig;
use crate::error::{AppError, open_input};
use crate::fit::PosteriorSample;
use crate::io::netcdf::{AttrValue, NcFile, NcVariable, VarData, decode, encode};

const CHAIN_DIM: &str = "chain";
const DRAW_DIM: &str = "draw";

/// Run description stored as global attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceMetadata {
    pub change_points: usize,
    pub sampler: SamplerConfig,
    pub created_at: String,
}

pub fn write_trace(path: &Path, posterior: &PosteriorSample, meta: &TraceMetadata) -> Result<(), AppError> {
    let file = to_netcdf(posterior, meta)?;
    let bytes = encode(&file)?;
    fs::write(path, bytes).map_err(|e| AppError::io(format!("Failed to write trace '{}': {e}", path.display())))?;
    info!("wrote posterior trace ({} draws) to {}", posterior.total_draws(), path.display());
    Ok(())
}

/// Reload a trace written by [`write_trace`].
///
/// Sampler diagnostics are not persisted, so `stats` comes back empty.
pub fn read_trace(path: &Path) -> Result<PosteriorSample, AppError> {
    read_trace_with_metadata(path).map(|(posterior, _)| posterior)
}

/// Reload a trace together with the run description in its global attributes.
pub fn read_trace_with_metadata(path: &Path) -> Result<(PosteriorSample, TraceMetadata), AppError> {
    let mut file = open_input(path, "trace file")?;
    let mut bytes = Vec::new();
    std::io::Read::read_to_end(&mut file, &mut bytes)
        .map_err(|e| AppError::io(format!("Failed to read trace '{}': {e}", path.display())))?;
    let file = decode(&bytes)?;
    let posterior = from_netcdf(&file)?;
    let meta = metadata_from_netcdf(&file, &posterior)?;
    Ok((posterior, meta))
}

fn to_netcdf(posterior: &PosteriorSample, meta: &TraceMetadata) -> Result<NcFile, AppError> {
    let chains = posterior.num_chains();
    let draws = posterior.draws_per_chain();
    let as_i32 = |v: usize, what: &str| {
        i32::try_from(v).map_err(|_| AppError::io(format!("{what} ({v}) does not fit a NetCDF int.")))
    };

    let mut vars = vec![
        NcVariable {
            name: CHAIN_DIM.to_string(),
            dims: vec![0],
            attrs: Vec::new(),
            data: VarData::Int((0..chains).map(|c| as_i32(c, "chain")).collect::<Result<_, _>>()?),
        },
        NcVariable {
            name: DRAW_DIM.to_string(),
            dims: vec![1],
            attrs: Vec::new(),
            data: VarData::Int((0..draws).map(|d| as_i32(d, "draw")).collect::<Result<_, _>>()?),
        },
    ];

    for (col, name) in posterior.parameter_names.iter().enumerate() {
        let values: Vec<f64> = (0..chains).flat_map(|c| posterior.chain_values(c, col)).collect();
        let data = if name.starts_with("tau") {
            VarData::Int(values.iter().map(|v| v.round() as i32).collect())
        } else {
            VarData::Double(values)
        };
        vars.push(NcVariable {
            name: name.clone(),
            dims: vec![0, 1],
            attrs: Vec::new(),
            data,
        });
    }

    Ok(NcFile {
        dims: vec![(CHAIN_DIM.to_string(), chains), (DRAW_DIM.to_string(), draws)],
        attrs: vec![
            ("created_at".to_string(), AttrValue::Text(meta.created_at.clone())),
            (
                "created_by".to_string(),
                AttrValue::Text(format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))),
            ),
            ("inference_method".to_string(), AttrValue::Text("metropolis-within-gibbs".to_string())),
            ("change_points".to_string(), AttrValue::Ints(vec![as_i32(meta.change_points, "k")?])),
            ("tune".to_string(), AttrValue::Ints(vec![as_i32(meta.sampler.tune, "tune")?])),
            // NetCDF classic has no 64-bit integer type.
            ("seed".to_string(), AttrValue::Text(meta.sampler.seed.to_string())),
        ],
        vars,
    })
}

fn from_netcdf(file: &NcFile) -> Result<PosteriorSample, AppError> {
    let (chain_id, draw_id) = match (file.dim_id(CHAIN_DIM), file.dim_id(DRAW_DIM)) {
        (Some(c), Some(d)) => (c, d),
        _ => return Err(AppError::data_format("Trace is missing the `chain`/`draw` dimensions.")),
    };
    let chains = file.dims[chain_id].1;
    let draws = file.dims[draw_id].1;

    let params: Vec<&NcVariable> = file
        .vars
        .iter()
        .filter(|v| v.dims == [chain_id, draw_id])
        .collect();
    if params.is_empty() {
        return Err(AppError::data_format("Trace contains no parameter variables."));
    }

    let names: Vec<String> = params.iter().map(|v| v.name.clone()).collect();
    let columns: Vec<Vec<f64>> = params.iter().map(|v| v.data.to_f64()).collect();
    let matrices = (0..chains)
        .map(|c| DMatrix::from_fn(draws, names.len(), |d, p| columns[p][c * draws + d]))
        .collect();

    PosteriorSample::new(names, matrices, Vec::new())
}

fn metadata_from_netcdf(file: &NcFile, posterior: &PosteriorSample) -> Result<TraceMetadata, AppError> {
    let int_attr = |name: &str| match file.attr(name) {
        Some(AttrValue::Ints(v)) if v.len() == 1 && v[0] >= 0 => Ok(v[0] as usize),
        _ => Err(AppError::data_format(format!("Trace attribute `{name}` is missing or not a count."))),
    };
    let seed = match file.attr("seed") {
        Some(AttrValue::Text(s)) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
    .ok_or_else(|| AppError::data_format("Trace attribute `seed` is missing or not an unsigned integer."))?;
    let created_at = match file.attr("created_at") {
        Some(AttrValue::Text(s)) => s.clone(),
        _ => String::new(),
    };

    Ok(TraceMetadata {
        change_points: int_attr("change_points")?,
        sampler: SamplerConfig {
            draws: posterior.draws_per_chain(),
            tune: int_attr("tune")?,
            chains: posterior.num_chains(),
            seed,
        },
        created_at,
    })
}
