use std::{fmt, str::FromStr, sync::Arc};

use async_trait::async_trait;
use cid::Cid;
use futures::{AsyncRead, AsyncWrite};
use ndarray::{ArrayViewD, Slice};
use tracing::debug;

use crate::{
    array::DataArray,
    cache::Cacheable,
    chunk::Chunk,
    coords::{Coord, CoordValues},
    errors::{Error, Result},
    extio::{ExtendedAsyncRead, ExtendedAsyncWrite},
    helpers::{cartesian, narrow},
    node::{Node, NODE_DATASET},
    range::{FloatRange, IntRange},
    resolver::Resolver,
    time::TimeRange,
};

/// The dimensions a dataset's variables may be laid out along.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Dim {
    Member,
    Time,
    Lat,
    Lon,
}

impl Dim {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dim::Member => "member",
            Dim::Time => "time",
            Dim::Lat => "lat",
            Dim::Lon => "lon",
        }
    }

    fn code(&self) -> u8 {
        match self {
            Dim::Member => 0,
            Dim::Time => 1,
            Dim::Lat => 2,
            Dim::Lon => 3,
        }
    }

    fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Dim::Member),
            1 => Ok(Dim::Time),
            2 => Ok(Dim::Lat),
            3 => Ok(Dim::Lon),
            _ => Err(Error::Format(format!("unknown dimension code {code}"))),
        }
    }
}

impl FromStr for Dim {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "member" => Ok(Dim::Member),
            "time" => Ok(Dim::Time),
            "lat" => Ok(Dim::Lat),
            "lon" => Ok(Dim::Lon),
            _ => Err(Error::BadDimension(name.to_string())),
        }
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A collection of gridded variables sharing time, latitude, longitude and ensemble member
/// coordinates.
///
/// Datasets are immutable. `add_variable` stores the variable's chunks and returns a new
/// `Dataset`; `commit` stores the dataset node itself and returns its CID.
///
pub struct Dataset {
    pub title: String,
    pub time: TimeRange,
    pub lat: FloatRange<f64>,
    pub lon: FloatRange<f64>,
    pub member: IntRange<i64>,
    pub variables: Vec<Variable>,

    /// Set when the dataset was loaded from, or committed to, the store
    pub cid: Option<Cid>,

    resolver: Arc<Resolver>,
}

/// A variable's layout in the store
///
#[derive(Clone, Debug)]
pub struct Variable {
    /// Short name, e.g. "pcp"
    pub name: String,

    /// Descriptive name, e.g. "Daily precipitation"
    pub long_name: String,

    pub units: String,

    /// Dimensions in storage order
    pub dims: Vec<Dim>,

    /// Length of a chunk along each dimension. Chunks at the far edge of a dimension may be
    /// shorter.
    pub chunk_shape: Vec<usize>,

    /// Chunk CIDs in row major order of the chunk grid
    pub chunks: Vec<Cid>,
}

impl Variable {
    /// Number of chunks along each dimension, for a variable of the given shape
    pub(crate) fn grid(&self, shape: &[usize]) -> Vec<usize> {
        shape
            .iter()
            .zip(&self.chunk_shape)
            .map(|(&len, &chunk)| len.div_ceil(chunk))
            .collect()
    }

    /// Reject a layout read back from the store that can't address `shape`
    fn check(&self, shape: &[usize]) -> Result<()> {
        if self.chunk_shape.len() != self.dims.len() || self.chunk_shape.contains(&0) {
            return Err(Error::Format(format!(
                "{}: bad chunk shape {:?} for dimensions {:?}",
                self.name, self.chunk_shape, self.dims
            )));
        }
        let expected: usize = self.grid(shape).iter().product();
        if self.chunks.len() != expected {
            return Err(Error::Format(format!(
                "{}: {} chunks stored, grid needs {expected}",
                self.name,
                self.chunks.len()
            )));
        }

        Ok(())
    }

    fn size(&self) -> u64 {
        let strings = self.name.len() + self.long_name.len() + self.units.len();
        let cids: usize = self.chunks.iter().map(|cid| cid.encoded_len()).sum();

        (12 + strings + 1 + self.dims.len() * 5 + 4 + cids) as u64
    }
}

impl Dataset {
    pub fn new<S: Into<String>>(
        title: S,
        time: TimeRange,
        lat: FloatRange<f64>,
        lon: FloatRange<f64>,
        member: IntRange<i64>,
        resolver: Arc<Resolver>,
    ) -> Self {
        Self {
            title: title.into(),
            time,
            lat,
            lon,
            member,
            variables: vec![],
            cid: None,
            resolver,
        }
    }

    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.resolver
    }

    /// Store the dataset node and return its CID.
    pub async fn commit(&self) -> Result<Cid> {
        self.resolver.save(self).await
    }

    /// Split `data` into chunks, store them, and return a new dataset that includes the variable.
    ///
    /// A variable with the same name is replaced.
    ///
    #[allow(clippy::too_many_arguments)]
    pub async fn add_variable<S: Into<String>>(
        &self,
        name: S,
        long_name: S,
        units: S,
        dims: &[Dim],
        chunk_shape: &[usize],
        data: ArrayViewD<'_, f32>,
    ) -> Result<Self> {
        let name = name.into();
        let shape: Vec<usize> = dims.iter().map(|&dim| self.dim_len(dim)).collect();
        if data.shape() != shape.as_slice() {
            return Err(Error::Shape(format!(
                "{name}: data has shape {:?}, dimensions {dims:?} have shape {shape:?}",
                data.shape()
            )));
        }
        if chunk_shape.len() != dims.len() || chunk_shape.contains(&0) {
            return Err(Error::Shape(format!(
                "{name}: bad chunk shape {chunk_shape:?} for dimensions {dims:?}"
            )));
        }

        let mut variable = Variable {
            name,
            long_name: long_name.into(),
            units: units.into(),
            dims: dims.to_vec(),
            chunk_shape: chunk_shape.to_vec(),
            chunks: vec![],
        };

        let grid: Vec<_> = variable.grid(&shape).into_iter().map(|n| 0..n).collect();
        for index in cartesian(&grid) {
            let block = data.slice_each_axis(|ax| {
                let axis = ax.axis.index();
                let start = index[axis] * chunk_shape[axis];
                let end = (start + chunk_shape[axis]).min(shape[axis]);
                Slice::from(start..end)
            });
            let cid = self.resolver.save(&Chunk::new(block)).await?;
            variable.chunks.push(cid);
        }
        debug!(
            variable = %variable.name,
            chunks = variable.chunks.len(),
            "stored variable"
        );

        let mut variables: Vec<Variable> = self
            .variables
            .iter()
            .filter(|existing| existing.name != variable.name)
            .cloned()
            .collect();
        variables.push(variable);

        Ok(Self {
            title: self.title.clone(),
            time: self.time.clone(),
            lat: self.lat.clone(),
            lon: self.lon.clone(),
            member: self.member.clone(),
            variables,
            cid: None,
            resolver: Arc::clone(&self.resolver),
        })
    }

    pub fn get_variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|variable| variable.name == name)
    }

    /// A lazy array over the named variable. Nothing is read until the array is computed.
    ///
    pub fn variable(&self, name: &str) -> Result<DataArray> {
        let variable = self
            .get_variable(name)
            .ok_or_else(|| Error::BadName(name.to_string()))?;
        let coords = variable
            .dims
            .iter()
            .map(|&dim| self.coordinate(dim))
            .collect();

        Ok(DataArray::source(
            variable.clone(),
            coords,
            Arc::clone(&self.resolver),
        ))
    }

    pub fn dim_len(&self, dim: Dim) -> usize {
        match dim {
            Dim::Member => self.member.len(),
            Dim::Time => self.time.len(),
            Dim::Lat => self.lat.len(),
            Dim::Lon => self.lon.len(),
        }
    }

    pub fn coordinate(&self, dim: Dim) -> Coord {
        let values = match dim {
            Dim::Member => CoordValues::Int(self.member.values()),
            Dim::Time => CoordValues::Time(self.time.values()),
            Dim::Lat => CoordValues::Float(self.lat.values()),
            Dim::Lon => CoordValues::Float(self.lon.values()),
        };

        Coord::new(dim.as_str(), values)
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Dataset: {}", self.title)?;
        write!(f, "  dimensions:")?;
        for dim in [Dim::Member, Dim::Time, Dim::Lat, Dim::Lon] {
            write!(f, " {dim}: {}", self.dim_len(dim))?;
        }
        writeln!(f)?;
        for variable in &self.variables {
            let dims: Vec<&str> = variable.dims.iter().map(Dim::as_str).collect();
            writeln!(
                f,
                "  {} ({}) [{}] {}",
                variable.name,
                dims.join(", "),
                variable.units,
                variable.long_name
            )?;
        }

        Ok(())
    }
}

#[async_trait]
impl Node for Dataset {
    const NODE_TYPE: u8 = NODE_DATASET;

    async fn save_to(&self, stream: &mut (impl AsyncWrite + Unpin + Send)) -> Result<()> {
        stream.write_string(&self.title).await?;

        stream.write_i64(self.time.start).await?;
        stream.write_i64(self.time.step).await?;
        stream.write_u32(narrow(self.time.steps, "time steps")?).await?;
        for range in [&self.lat, &self.lon] {
            stream.write_f64(range.start).await?;
            stream.write_f64(range.step).await?;
            stream.write_u32(narrow(range.steps, "grid steps")?).await?;
        }
        stream.write_i64(self.member.start).await?;
        stream.write_i64(self.member.step).await?;
        stream.write_u32(narrow(self.member.steps, "members")?).await?;

        stream.write_byte(narrow(self.variables.len(), "variable count")?).await?;
        for variable in &self.variables {
            stream.write_string(&variable.name).await?;
            stream.write_string(&variable.long_name).await?;
            stream.write_string(&variable.units).await?;
            stream.write_byte(narrow(variable.dims.len(), "dimension count")?).await?;
            for (dim, &len) in variable.dims.iter().zip(&variable.chunk_shape) {
                stream.write_byte(dim.code()).await?;
                stream.write_u32(narrow(len, "chunk length")?).await?;
            }
            stream.write_u32(narrow(variable.chunks.len(), "chunk count")?).await?;
            for cid in &variable.chunks {
                stream.write_cid(cid).await?;
            }
        }

        Ok(())
    }

    async fn load_from(
        resolver: &Arc<Resolver>,
        stream: &mut (impl AsyncRead + Unpin + Send),
    ) -> Result<Self> {
        let title = stream.read_string().await?;

        let time = TimeRange::new(
            stream.read_i64().await?,
            stream.read_i64().await?,
            stream.read_u32().await? as usize,
        );
        let lat = FloatRange::new(
            stream.read_f64().await?,
            stream.read_f64().await?,
            stream.read_u32().await? as usize,
        );
        let lon = FloatRange::new(
            stream.read_f64().await?,
            stream.read_f64().await?,
            stream.read_u32().await? as usize,
        );
        let member = IntRange::new(
            stream.read_i64().await?,
            stream.read_i64().await?,
            stream.read_u32().await? as usize,
        );

        let n_variables = stream.read_byte().await? as usize;
        let mut variables = Vec::with_capacity(n_variables);
        for _ in 0..n_variables {
            let name = stream.read_string().await?;
            let long_name = stream.read_string().await?;
            let units = stream.read_string().await?;
            let ndim = stream.read_byte().await? as usize;
            let mut dims = Vec::with_capacity(ndim);
            let mut chunk_shape = Vec::with_capacity(ndim);
            for _ in 0..ndim {
                dims.push(Dim::from_code(stream.read_byte().await?)?);
                chunk_shape.push(stream.read_u32().await? as usize);
            }
            let n_chunks = stream.read_u32().await? as usize;
            let mut chunks = Vec::with_capacity(n_chunks);
            for _ in 0..n_chunks {
                chunks.push(stream.read_cid().await?);
            }

            variables.push(Variable {
                name,
                long_name,
                units,
                dims,
                chunk_shape,
                chunks,
            });
        }

        let dataset = Self {
            title,
            time,
            lat,
            lon,
            member,
            variables,
            cid: None,
            resolver: Arc::clone(resolver),
        };
        for variable in &dataset.variables {
            let shape: Vec<usize> = variable
                .dims
                .iter()
                .map(|&dim| dataset.dim_len(dim))
                .collect();
            variable.check(&shape)?;
        }

        Ok(dataset)
    }

    fn ls(&self) -> Vec<(String, Cid)> {
        let mut ls = vec![];
        for variable in &self.variables {
            for (index, cid) in variable.chunks.iter().enumerate() {
                ls.push((format!("{}/{index}", variable.name), *cid));
            }
        }

        ls
    }
}

impl Cacheable for Dataset {
    fn size(&self) -> u64 {
        let coordinates = 3 * 20 + 16;
        let variables: u64 = self.variables.iter().map(Variable::size).sum();

        Resolver::HEADER_SIZE + 4 + self.title.len() as u64 + coordinates + 1 + variables
    }
}
