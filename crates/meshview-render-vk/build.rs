use std::{env, fs, path::PathBuf};

// Vertex layout shared by every program (see `pipeline::vertex_attributes`):
//   location 0 pos, 1 color, 2 uv, 3 normal, 4 material id (int)
const SCENE_VERT: &str = r#"
#version 450
layout(location = 0) in vec3 inPos;
layout(location = 1) in vec3 inColor;
layout(location = 2) in vec2 inUv;
layout(location = 3) in vec3 inNormal;
layout(location = 4) in int inMaterial;

layout(set = 0, binding = 0) uniform Camera {
  mat4 model;
  mat4 view;
  mat4 proj;
  vec3 camPos;
} cam;

layout(set = 0, binding = 1) uniform Light {
  vec3 pos;
  vec3 color;
  mat4 mvp;
} light;

layout(location = 0) out vec3 vWorld;
layout(location = 1) out vec3 vNormal;
layout(location = 2) out vec2 vUv;
layout(location = 3) out vec3 vColor;
layout(location = 4) out vec4 vShadow;

void main() {
  vec4 world = cam.model * vec4(inPos, 1.0);
  vWorld = world.xyz;
  vNormal = mat3(cam.model) * inNormal;
  vUv = inUv;
  vColor = inColor;
  vShadow = light.mvp * vec4(inPos, 1.0);
  gl_Position = cam.proj * cam.view * world;
}
"#;

const MATERIAL_BLOCK: &str = r#"
layout(set = 1, binding = 0) uniform Material {
  vec3 ambient;
  vec3 diffuse;
  vec3 specular;
  vec3 transmittance;
  vec3 emission;
  int illum;
  float shininess;
  float ior;
  float dissolve;
  float roughness;
  float metallic;
  float sheen;
  float clearcoatThickness;
  float clearcoatRoughness;
  float anisotropy;
  float anisotropyRotation;
  int ambientTex;
  int diffuseTex;
  int specularTex;
  int specularHighlightTex;
  int bumpTex;
  int displacementTex;
  int alphaTex;
  int reflectionTex;
  int roughnessTex;
  int metallicTex;
  int sheenTex;
  int emissiveTex;
  int normalTex;
} mat;

layout(set = 1, binding = 1) uniform sampler2D ambientMap;
layout(set = 1, binding = 2) uniform sampler2D diffuseMap;
layout(set = 1, binding = 3) uniform sampler2D specularMap;
layout(set = 1, binding = 4) uniform sampler2D specularHighlightMap;
layout(set = 1, binding = 5) uniform sampler2D bumpMap;
layout(set = 1, binding = 6) uniform sampler2D displacementMap;
layout(set = 1, binding = 7) uniform sampler2D alphaMap;
layout(set = 1, binding = 8) uniform sampler2D reflectionMap;

vec3 baseColor(vec2 uv) {
  vec3 c = mat.diffuse;
  if (mat.diffuseTex != 0) {
    c *= texture(diffuseMap, uv).rgb;
  }
  return c;
}
"#;

const SCENE_FRAG: &str = r#"
layout(set = 0, binding = 1) uniform Light {
  vec3 pos;
  vec3 color;
  mat4 mvp;
} light;
layout(set = 0, binding = 2) uniform sampler2D shadowMap;

layout(location = 0) in vec3 vWorld;
layout(location = 1) in vec3 vNormal;
layout(location = 2) in vec2 vUv;
layout(location = 3) in vec3 vColor;
layout(location = 4) in vec4 vShadow;

layout(location = 0) out vec4 outColor;

float lit() {
  vec3 ndc = vShadow.xyz / vShadow.w;
  vec2 uv = ndc.xy * 0.5 + 0.5;
  if (uv.x < 0.0 || uv.x > 1.0 || uv.y < 0.0 || uv.y > 1.0 || ndc.z > 1.0) {
    return 1.0;
  }
  return ndc.z - 0.0005 > texture(shadowMap, uv).r ? 0.0 : 1.0;
}

void main() {
  vec3 base = baseColor(vUv) * vColor;
  vec3 n = normalize(vNormal);
  vec3 l = normalize(light.pos - vWorld);
  float lambert = max(dot(n, l), 0.0);
  vec3 color = base * (0.2 + lambert * lit() * light.color * 0.5) + mat.emission;
  outColor = vec4(color, mat.dissolve);
}
"#;

const UNLIT_FRAG: &str = r#"
layout(location = 0) in vec3 vWorld;
layout(location = 1) in vec3 vNormal;
layout(location = 2) in vec2 vUv;
layout(location = 3) in vec3 vColor;
layout(location = 4) in vec4 vShadow;

layout(location = 0) out vec4 outColor;

void main() {
  outColor = vec4(baseColor(vUv) * vColor, 1.0);
}
"#;

const WIREFRAME_VERT: &str = r#"
#version 450
layout(location = 0) in vec3 inPos;

layout(set = 0, binding = 0) uniform Camera {
  mat4 model;
  mat4 view;
  mat4 proj;
  vec3 camPos;
} cam;

void main() {
  gl_Position = cam.proj * cam.view * cam.model * vec4(inPos, 1.0);
}
"#;

const WIREFRAME_FRAG: &str = r#"
#version 450
layout(location = 0) out vec4 outColor;

void main() {
  outColor = vec4(0.0, 0.0, 0.0, 1.0);
}
"#;

const SHADOW_VERT: &str = r#"
#version 450
layout(location = 0) in vec3 inPos;

layout(set = 0, binding = 0) uniform Light {
  vec3 pos;
  vec3 color;
  mat4 mvp;
} light;

void main() {
  gl_Position = light.mvp * vec4(inPos, 1.0);
}
"#;

fn main() {
  let out = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR"));

  let scene_frag = format!("#version 450\n{MATERIAL_BLOCK}{SCENE_FRAG}");
  let unlit_frag = format!("#version 450\n{MATERIAL_BLOCK}{UNLIT_FRAG}");

  let programs: [(&str, shaderc::ShaderKind, &str); 7] = [
    ("scene.vert", shaderc::ShaderKind::Vertex, SCENE_VERT),
    ("scene.frag", shaderc::ShaderKind::Fragment, &scene_frag),
    ("scene_no_lighting.vert", shaderc::ShaderKind::Vertex, SCENE_VERT),
    ("scene_no_lighting.frag", shaderc::ShaderKind::Fragment, &unlit_frag),
    ("wireframe.vert", shaderc::ShaderKind::Vertex, WIREFRAME_VERT),
    ("wireframe.frag", shaderc::ShaderKind::Fragment, WIREFRAME_FRAG),
    ("shadow.vert", shaderc::ShaderKind::Vertex, SHADOW_VERT),
  ];

  let comp = shaderc::Compiler::new().expect("shaderc compiler");
  let mut opts = shaderc::CompileOptions::new().expect("shaderc options");
  opts.set_target_env(
    shaderc::TargetEnv::Vulkan,
    shaderc::EnvVersion::Vulkan1_2 as u32,
  );
  opts.set_optimization_level(shaderc::OptimizationLevel::Performance);

  for (name, kind, src) in programs {
    let spv = comp
      .compile_into_spirv(src, kind, name, "main", Some(&opts))
      .unwrap_or_else(|e| panic!("{name}: {e}"));
    fs::write(out.join(format!("{name}.spv")), spv.as_binary_u8())
      .unwrap_or_else(|e| panic!("write {name}.spv: {e}"));
  }

  println!("cargo:rerun-if-changed=build.rs");
}
