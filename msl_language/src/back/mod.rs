pub mod lower_verilog;
