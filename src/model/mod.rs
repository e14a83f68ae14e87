pub mod architecture;
pub mod layer_shape;
pub mod layer_type;
pub mod tensor_desc;
pub mod weight_init;
