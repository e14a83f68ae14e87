/// Geometry shared by `conv2d` and `convt2d`.
///
/// The tagged form of both kinds lists the kernel dimensions first, then
/// stride and padding. For `conv2d` that is `(out, in, kh, kw, stride, padding)`
/// and for `convt2d` it is `(in, out, kh, kw, stride, padding)`, so in both
/// cases the first four values are the weight tensor's shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConvShape {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel_h: usize,
    pub kernel_w: usize,
    pub stride: usize,
    pub padding: usize,
}

impl ConvShape {
    pub fn new(in_channels: usize, out_channels: usize) -> Self {
        Self {
            in_channels,
            out_channels,
            kernel_h: 3,
            kernel_w: 3,
            stride: 1,
            padding: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolShape {
    pub kernel: usize,
    pub stride: usize,
    pub padding: usize,
}

impl PoolShape {
    pub fn new(kernel: usize) -> Self {
        Self {
            kernel,
            stride: kernel,
            padding: 0,
        }
    }
}
