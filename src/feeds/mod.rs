pub mod option_data;
