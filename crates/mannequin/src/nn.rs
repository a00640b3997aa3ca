//! Neural Network inference.
//!
//! This is a thin layer over [`tract_onnx`] that loads an ONNX model once into an immutable,
//! optimized plan. The plan is shared between threads without locking.

use std::{
    ops::{Index, RangeInclusive},
    path::Path,
    sync::Arc,
};

use anyhow::{bail, Context};
use image::{imageops, Rgb, RgbImage};
use tract_onnx::prelude::{
    Framework, Graph, InferenceModelExt, SimplePlan, TValue, TVec, Tensor as TractTensor,
    TypedFact, TypedOp,
};

type Model = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// A dense, row-major `f32` tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl Tensor {
    /// Creates a tensor by calling `f` with the index of every element, in row-major order.
    pub fn from_shape_fn<const N: usize>(
        shape: [usize; N],
        mut f: impl FnMut([usize; N]) -> f32,
    ) -> Self {
        let len = shape.iter().product();
        let mut data = Vec::with_capacity(len);
        let mut index = [0; N];
        for _ in 0..len {
            data.push(f(index));
            for dim in (0..N).rev() {
                index[dim] += 1;
                if index[dim] < shape[dim] {
                    break;
                }
                index[dim] = 0;
            }
        }

        Self {
            shape: shape.to_vec(),
            data,
        }
    }

    /// Creates a tensor from its shape and row-major element data.
    ///
    /// # Panics
    ///
    /// Panics if the number of elements in `data` does not match `shape`.
    pub fn from_vec(shape: Vec<usize>, data: Vec<f32>) -> Self {
        assert_eq!(
            shape.iter().product::<usize>(),
            data.len(),
            "tensor shape {shape:?} does not match element count {}",
            data.len()
        );
        Self { shape, data }
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    fn to_tract(&self) -> anyhow::Result<TractTensor> {
        TractTensor::from_shape(&self.shape, &self.data)
    }

    fn from_tract(tensor: &TractTensor) -> anyhow::Result<Self> {
        Ok(Self {
            shape: tensor.shape().to_vec(),
            data: tensor.as_slice::<f32>()?.to_vec(),
        })
    }
}

/// The output tensors of a network invocation.
#[derive(Debug, Clone)]
pub struct Outputs {
    inner: Vec<Tensor>,
}

impl Outputs {
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Index<usize> for Outputs {
    type Output = Tensor;

    fn index(&self, index: usize) -> &Tensor {
        &self.inner[index]
    }
}

impl From<Vec<Tensor>> for Outputs {
    fn from(inner: Vec<Tensor>) -> Self {
        Self { inner }
    }
}

/// Neural network loader.
pub struct Loader {
    model_data: Vec<u8>,
    outputs: Option<Vec<usize>>,
}

impl Loader {
    /// Only compute the specified outputs during inference.
    ///
    /// This takes a list of network output indices. The [`Outputs`] returned from
    /// [`NeuralNetwork::estimate`] will then only contain the chosen tensors, in the given order.
    pub fn with_output_selection<O>(mut self, outputs: O) -> Self
    where
        O: Into<Vec<usize>>,
    {
        self.outputs = Some(outputs.into());
        self
    }

    /// Loads and optimizes the network.
    ///
    /// Returns an error if the network data is malformed, if the network data is incomplete, or if
    /// the network uses unimplemented operations.
    pub fn load(self) -> anyhow::Result<NeuralNetwork> {
        let graph = tract_onnx::onnx()
            .model_for_read(&mut &*self.model_data)?
            .into_optimized()?;
        let outputs = graph.output_outlets()?;
        let selected_outputs = match self.outputs {
            Some(indices) => indices
                .iter()
                .map(|&i| {
                    outputs.get(i).copied().with_context(|| {
                        format!("network has no output #{i} ({} outputs)", outputs.len())
                    })
                })
                .collect::<anyhow::Result<Vec<_>>>()?,
            None => outputs.to_vec(),
        };
        let model = SimplePlan::new_for_outputs(graph, &selected_outputs)?;

        Ok(NeuralNetwork(Arc::new(model)))
    }
}

/// A neural network that can be used for inference.
///
/// This is a cheaply [`Clone`]able handle to the underlying network structures.
#[derive(Clone)]
pub struct NeuralNetwork(Arc<Model>);

impl NeuralNetwork {
    /// Reads a pre-trained model from an ONNX file path.
    ///
    /// The path must have a `.onnx` extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Loader> {
        Self::from_path_impl(path.as_ref())
    }

    fn from_path_impl(path: &Path) -> anyhow::Result<Loader> {
        match path.extension() {
            Some(ext) if ext == "onnx" => {}
            _ => bail!(
                "neural network file '{}' must have `.onnx` extension",
                path.display()
            ),
        }

        let model_data = std::fs::read(path)
            .with_context(|| format!("failed to read neural network '{}'", path.display()))?;
        Ok(Self::from_onnx(model_data))
    }

    /// Loads a pre-trained model from an in-memory ONNX file.
    pub fn from_onnx(raw: Vec<u8>) -> Loader {
        Loader {
            model_data: raw,
            outputs: None,
        }
    }

    /// Returns the number of input nodes of the network.
    pub fn num_inputs(&self) -> usize {
        self.0.model().inputs.len()
    }

    /// Returns the concrete tensor shape of input `index`.
    pub fn input_shape(&self, index: usize) -> anyhow::Result<Vec<usize>> {
        let fact = self.0.model().input_fact(index)?;
        let shape = fact
            .shape
            .as_concrete()
            .with_context(|| format!("network input #{index} has a symbolic shape"))?;
        Ok(shape.to_vec())
    }

    /// Runs the network on a list of input tensors, one per network input.
    #[doc(alias = "infer")]
    pub fn estimate(&self, inputs: &[Tensor]) -> anyhow::Result<Outputs> {
        let inputs = inputs
            .iter()
            .map(|t| Ok(TValue::from_const(Arc::new(t.to_tract()?))))
            .collect::<anyhow::Result<TVec<_>>>()?;
        let outputs = self.0.run(inputs)?;
        let inner = outputs
            .iter()
            .map(|t| Tensor::from_tract(t))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Outputs { inner })
    }
}

/// Describes in what order a CNN expects its input image data.
///
/// - `N` is the number of images, fixed at 1.
/// - `C` is the number of color channels, 3 for RGB inputs.
/// - `H` and `W` are the height and width of the input, respectively.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CnnInputShape {
    /// Shape is `[N, C, H, W]`.
    NCHW,
    /// Shape is `[N, H, W, C]`.
    NHWC,
}

impl CnnInputShape {
    /// Detects the layout and input resolution `(width, height)` from an input tensor shape.
    fn detect(shape: &[usize]) -> anyhow::Result<(Self, u32, u32)> {
        let (layout, w, h) = match *shape {
            [1, 3, h, w] => (Self::NCHW, w, h),
            [1, h, w, 3] => (Self::NHWC, w, h),
            _ => bail!("unsupported CNN input shape {shape:?}"),
        };
        Ok((layout, w.try_into()?, h.try_into()?))
    }
}

/// Maps sRGB color values to the range a network expects.
#[derive(Debug, Clone)]
pub struct ColorMapper {
    target_range: RangeInclusive<f32>,
}

impl ColorMapper {
    /// Creates a simple color mapper that uniformly maps sRGB values to `target_range`.
    ///
    /// Note that this operates on *non-linear* sRGB colors, but maps them linearly to the target
    /// range.
    pub fn linear(target_range: RangeInclusive<f32>) -> Self {
        assert!(target_range.end() > target_range.start());
        Self { target_range }
    }

    fn map(&self, color: Rgb<u8>) -> [f32; 3] {
        let start = *self.target_range.start();
        let end = *self.target_range.end();
        let adjust_range = (end - start) / 255.0;
        color.0.map(|col| col as f32 * adjust_range + start)
    }
}

/// How an image was fit into a square network input.
///
/// The image is centered on a black square canvas whose side is the image's longest side, and the
/// canvas is scaled to the network resolution. This keeps the aspect ratio intact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    side: f32,
    offset_x: f32,
    offset_y: f32,
    input_width: f32,
    input_height: f32,
}

impl Letterbox {
    pub fn new(image_width: u32, image_height: u32, input_width: u32, input_height: u32) -> Self {
        let side = image_width.max(image_height);
        Self {
            side: side as f32,
            offset_x: ((side - image_width) / 2) as f32,
            offset_y: ((side - image_height) / 2) as f32,
            input_width: input_width as f32,
            input_height: input_height as f32,
        }
    }

    /// Maps a point in network input coordinates back to source image pixels.
    pub fn to_image(&self, x: f32, y: f32) -> (f32, f32) {
        (
            x * self.side / self.input_width - self.offset_x,
            y * self.side / self.input_height - self.offset_y,
        )
    }

    /// Scale factor from network input units to source image pixels along X.
    pub fn scale(&self) -> f32 {
        self.side / self.input_width
    }

    /// Renders `image` into the letterboxed network input.
    fn apply(&self, image: &RgbImage) -> RgbImage {
        let side = self.side as u32;
        let mut canvas = RgbImage::new(side, side);
        imageops::overlay(
            &mut canvas,
            image,
            self.offset_x as i64,
            self.offset_y as i64,
        );
        imageops::resize(
            &canvas,
            self.input_width as u32,
            self.input_height as u32,
            imageops::FilterType::Triangle,
        )
    }
}

/// A convolutional neural network (CNN) that operates on RGB image data.
#[derive(Clone)]
pub struct Cnn {
    nn: NeuralNetwork,
    shape: CnnInputShape,
    input_res: (u32, u32),
    color_mapper: ColorMapper,
}

impl Cnn {
    /// Creates a CNN wrapper from a [`NeuralNetwork`].
    ///
    /// The network must have exactly one input, laid out as either NCHW or NHWC.
    pub fn new(nn: NeuralNetwork, color_mapper: ColorMapper) -> anyhow::Result<Self> {
        if nn.num_inputs() != 1 {
            bail!(
                "CNN network has to take exactly 1 input, this one takes {}",
                nn.num_inputs(),
            );
        }
        let (shape, w, h) = CnnInputShape::detect(&nn.input_shape(0)?)?;
        log::debug!("CNN input: {w}x{h} {shape:?}");

        Ok(Self {
            nn,
            shape,
            input_res: (w, h),
            color_mapper,
        })
    }

    /// Returns the expected input image size as `(width, height)`.
    #[inline]
    pub fn input_resolution(&self) -> (u32, u32) {
        self.input_res
    }

    /// Runs the network on an input image.
    ///
    /// The image is letterboxed to the network's input resolution. The returned [`Letterbox`]
    /// maps network coordinates back to `image`.
    pub fn estimate(&self, image: &RgbImage) -> anyhow::Result<(Outputs, Letterbox)> {
        let (w, h) = self.input_res;
        let letterbox = Letterbox::new(image.width(), image.height(), w, h);
        let input = letterbox.apply(image);
        let tensor = self.image_to_tensor(&input);
        Ok((self.nn.estimate(&[tensor])?, letterbox))
    }

    fn image_to_tensor(&self, input: &RgbImage) -> Tensor {
        let (w, h) = (self.input_res.0 as usize, self.input_res.1 as usize);
        let color =
            |x: usize, y: usize| self.color_mapper.map(*input.get_pixel(x as u32, y as u32));
        match self.shape {
            CnnInputShape::NCHW => {
                Tensor::from_shape_fn([1, 3, h, w], |[_, c, y, x]| color(x, y)[c])
            }
            CnnInputShape::NHWC => {
                Tensor::from_shape_fn([1, h, w, 3], |[_, y, x, c]| color(x, y)[c])
            }
        }
    }
}
